//! Channel pipeline: scales live mixer/failsafe channel values onto the
//! wire range, and builds the three frame payloads that carry them
//! (periodic channel data, and the two failsafe table variants).

use crate::shared::{
    CHANNELS_FRAME_MODE, FAILSAFE_FRAME_MODE, FAILSAFE_KEEP_LAST, FAILSAFE_MAX, FAILSAFE_MIN,
    FailsafeMode, MAX_CHANNELS, MULTICAST_FAILSAFE_CHANNELS, ModelView,
};

/// Scale a mixer output (`-1024..=1024`) onto the wire's tenths-of-percent
/// range, clamped to the frame's representable span.
pub fn convert(raw: i16) -> i16 {
    let scaled = raw.saturating_mul(10);
    scaled.clamp(FAILSAFE_MIN, FAILSAFE_MAX)
}

/// Live `CHANNELS_FAILSAFE_DATA` payload: a `{mode, count}` header followed
/// by `count` little-endian `i16` samples, one per channel the active PHY
/// mode carries (spec §4.7). Returns the number of bytes written.
pub fn write_channels_frame(model: &impl ModelView, out: &mut [u8]) -> usize {
    let count = model.phy_mode().channel_count();
    out[0] = CHANNELS_FRAME_MODE;
    out[1] = count;
    let mut offset = 2;
    for ch in 0..count {
        let value = convert(model.channel_value(ch));
        out[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        offset += 2;
    }
    offset
}

/// Populate a fixed-width failsafe table (one `i16` slot per channel, up to
/// [`MAX_CHANNELS`]) for channels `[channels_start, channels_start + 8 +
/// channels_count)`, per the module's three-way policy (spec §4.6):
/// - [`FailsafeMode::Custom`]: each slot carries the model's configured
///   failsafe value for that channel, scaled the same way live channel
///   data is.
/// - [`FailsafeMode::Hold`]: every in-range slot holds [`FAILSAFE_KEEP_LAST`]
///   ("receiver holds its last output").
/// - [`FailsafeMode::NoPulses`]: every in-range slot carries the live
///   channel value, scaled — there is no failsafe table override, so the
///   best approximation on the wire is "whatever the channel reads now".
/// Slots beyond the active range default to [`FAILSAFE_KEEP_LAST`].
pub fn populate_failsafe_table(model: &impl ModelView, table: &mut [i16; MAX_CHANNELS]) {
    for slot in table.iter_mut() {
        *slot = FAILSAFE_KEEP_LAST;
    }
    let active = (8u16 + model.channels_count() as u16).min(MAX_CHANNELS as u16) as u8;
    for slot in 0..active {
        let channel = model.channels_start().wrapping_add(slot);
        table[slot as usize] = match model.failsafe_mode() {
            FailsafeMode::Custom => convert(model.failsafe_channel_value(channel)),
            FailsafeMode::Hold => FAILSAFE_KEEP_LAST,
            FailsafeMode::NoPulses => convert(model.channel_value(channel)),
        };
    }
}

/// Multicast-style `CHANNELS_FAILSAFE_DATA` payload: `{mode: FAIL_SAFE,
/// count: 18}` followed by a flat table of 18 little-endian `i16`s.
/// Unreachable today since the multicast connection path is permanently
/// dead (see [`crate::transport::PulseModeSink`]), but kept as the
/// counterpart the original ships for that path.
pub fn write_multicast_failsafe_frame(model: &impl ModelView, out: &mut [u8]) -> usize {
    let mut table = [0i16; MAX_CHANNELS];
    populate_failsafe_table(model, &mut table);
    out[0] = FAILSAFE_FRAME_MODE;
    out[1] = MULTICAST_FAILSAFE_CHANNELS;
    let mut offset = 2;
    for value in &table {
        out[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        offset += 2;
    }
    offset
}

/// Unicast `SEND_COMMAND`-wrapped failsafe payload: `{0x11, 0x60, 36, <36
/// bytes of table>}`, a fixed 18-channel table regardless of the module's
/// actual active channel count (unused tail slots hold
/// [`FAILSAFE_KEEP_LAST`]).
pub fn write_unicast_failsafe_command(model: &impl ModelView, out: &mut [u8; 39]) {
    let mut table = [FAILSAFE_KEEP_LAST; MAX_CHANNELS];
    populate_failsafe_table(model, &mut table);
    out[0] = 0x11;
    out[1] = 0x60;
    out[2] = 36;
    for (i, value) in table.iter().enumerate() {
        let bytes = value.to_le_bytes();
        out[3 + i * 2] = bytes[0];
        out[3 + i * 2 + 1] = bytes[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeModel {
        phy_mode: crate::shared::PhyMode,
        channels_count: u8,
        values: [i16; MAX_CHANNELS],
        failsafe: [i16; MAX_CHANNELS],
        mode: FailsafeMode,
    }

    impl ModelView for FakeModel {
        fn phy_mode(&self) -> crate::shared::PhyMode {
            self.phy_mode
        }
        fn emi_standard(&self) -> u8 {
            0
        }
        fn telemetry_enabled(&self) -> bool {
            true
        }
        fn requested_mode(&self) -> crate::shared::RequestedMode {
            crate::shared::RequestedMode::Normal
        }
        fn channels_start(&self) -> u8 {
            0
        }
        fn channels_count(&self) -> u8 {
            self.channels_count
        }
        fn failsafe_mode(&self) -> FailsafeMode {
            self.mode
        }
        fn channel_value(&self, channel: u8) -> i16 {
            self.values[channel as usize]
        }
        fn failsafe_channel_value(&self, channel: u8) -> i16 {
            self.failsafe[channel as usize]
        }
    }

    fn model(mode: FailsafeMode) -> FakeModel {
        FakeModel {
            phy_mode: crate::shared::PhyMode::ClassicFlcr1_18Ch,
            channels_count: 8,
            values: [500; MAX_CHANNELS],
            failsafe: [50; MAX_CHANNELS],
            mode,
        }
    }

    #[test]
    fn convert_clamps_to_wire_range() {
        assert_eq!(convert(1024), FAILSAFE_MAX);
        assert_eq!(convert(-1024), FAILSAFE_MIN);
        assert_eq!(convert(0), 0);
        assert_eq!(convert(100), 1000);
    }

    #[test]
    fn channels_frame_carries_header_and_phy_mode_count() {
        let m = model(FailsafeMode::Hold);
        let mut out = [0u8; 64];
        let n = write_channels_frame(&m, &mut out);
        assert_eq!(out[0], CHANNELS_FRAME_MODE);
        assert_eq!(out[1], 18);
        assert_eq!(n, 2 + 18 * 2);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 5000);
    }

    #[test]
    fn hold_mode_fills_keep_last_sentinel_in_active_range() {
        let m = model(FailsafeMode::Hold);
        let mut table = [0i16; MAX_CHANNELS];
        populate_failsafe_table(&m, &mut table);
        assert!(table.iter().all(|&v| v == FAILSAFE_KEEP_LAST));
    }

    #[test]
    fn no_pulses_mode_carries_live_channel_value() {
        let m = model(FailsafeMode::NoPulses);
        let mut table = [0i16; MAX_CHANNELS];
        populate_failsafe_table(&m, &mut table);
        assert_eq!(table[0], 5000);
        // 8 + channels_count(8) = 16 channels are in range; the rest default.
        assert_eq!(table[15], 5000);
        assert_eq!(table[16], FAILSAFE_KEEP_LAST);
    }

    #[test]
    fn custom_mode_scales_configured_values() {
        let mut m = model(FailsafeMode::Custom);
        m.failsafe[0] = 50;
        m.failsafe[1] = -50;
        let mut table = [0i16; MAX_CHANNELS];
        populate_failsafe_table(&m, &mut table);
        assert_eq!(table[0], 500);
        assert_eq!(table[1], -500);
    }

    #[test]
    fn multicast_failsafe_frame_has_fixed_eighteen_channel_header() {
        let m = model(FailsafeMode::Hold);
        let mut out = [0u8; 64];
        let n = write_multicast_failsafe_frame(&m, &mut out);
        assert_eq!(&out[..2], &[FAILSAFE_FRAME_MODE, MULTICAST_FAILSAFE_CHANNELS]);
        assert_eq!(n, 2 + 18 * 2);
    }

    #[test]
    fn unicast_failsafe_command_header_is_fixed() {
        let m = model(FailsafeMode::NoPulses);
        let mut out = [0u8; 39];
        write_unicast_failsafe_command(&m, &mut out);
        assert_eq!(&out[..3], &[0x11, 0x60, 36]);
    }
}
