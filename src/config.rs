//! Config marshaller: builds the `MODULE_SET_CONFIG` payload in whichever
//! on-wire layout the module's [`PhyMode`] selects.
//!
//! Both layouts share a common 44-byte block — `Version, EMIStandard,
//! IsTwoWay, PhyMode, SignalStrengthRCChannelNb, FailsafeTimeout,
//! FailSafe[18], FailsafeOutputMode` — after which V1's tail additionally
//! carries a per-channel PWM frequency table that V0 modules don't
//! understand and the original never sends them.

use crate::channels::populate_failsafe_table;
use crate::shared::{FailsafeMode, MAX_CHANNELS, ModelView, PhyMode};

/// V0 layout size: common header+failsafe table+FailsafeOutputMode (44) +
/// PWMFrequency (2) + AnalogOutput (1) + ExternalBusType (1).
pub const CONFIG_V0_LEN: usize = 48;
/// V1 layout size: common header+failsafe table+FailsafeOutputMode (44) +
/// NewPortTypes (4) + PWMFrequencies[32] (64) + Synchronized (4).
pub const CONFIG_V1_LEN: usize = 116;

const VERSION_V0: u8 = 0;
const VERSION_V1: u8 = 1;

const SIGNAL_STRENGTH_RC_CHANNEL_NB: u8 = 0xFF;
const FAILSAFE_TIMEOUT_MS: u16 = 500;

/// `eEB_BusType::EB_BT_IBUS1`.
const EXTERNAL_BUS_TYPE_IBUS1: u8 = 0;
/// V0's packed `{Frequency: 50..400 Hz (15 bits), Synchronized (1 bit)}`,
/// always sent as 50 Hz unsynchronized.
const PWM_FREQUENCY_V0: u16 = 50;
/// V1's per-channel PWM frequency table entries, all 50 Hz.
const PWM_FREQUENCY_V1: u16 = 50;

/// A marshalled config frame payload, tagged by layout.
pub enum ConfigPayload {
    V0([u8; CONFIG_V0_LEN]),
    V1([u8; CONFIG_V1_LEN]),
}

impl ConfigPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::V0(b) => b.as_slice(),
            Self::V1(b) => b.as_slice(),
        }
    }
}

/// Writes the 44-byte block both versions share: a 7-byte fixed header
/// (`Version, EMIStandard, IsTwoWay, PhyMode, SignalStrengthRCChannelNb,
/// FailsafeTimeout`), the 36-byte failsafe table, then `FailsafeOutputMode`.
/// `out` must be at least 44 bytes.
fn write_common_header(out: &mut [u8], model: &impl ModelView, version: u8) {
    out[0] = version;
    out[1] = model.emi_standard();
    out[2] = model.telemetry_enabled() as u8;
    out[3] = model.phy_mode() as u8;
    out[4] = SIGNAL_STRENGTH_RC_CHANNEL_NB;
    out[5..7].copy_from_slice(&FAILSAFE_TIMEOUT_MS.to_le_bytes());

    let mut table = [0i16; MAX_CHANNELS];
    populate_failsafe_table(model, &mut table);
    for (i, value) in table.iter().enumerate() {
        let bytes = value.to_le_bytes();
        out[7 + i * 2] = bytes[0];
        out[7 + i * 2 + 1] = bytes[1];
    }

    out[43] = (model.failsafe_mode() != FailsafeMode::NoPulses) as u8;
}

fn write_v0_trailer(out: &mut [u8]) {
    out[0..2].copy_from_slice(&PWM_FREQUENCY_V0.to_le_bytes());
    out[2] = 0; // AnalogOutput: SES_ANALOG_OUTPUT_PWM
    out[3] = EXTERNAL_BUS_TYPE_IBUS1;
}

/// Per-channel PWM frequency table width (`SES_NB_MAX_CHANNELS`), wider
/// than [`MAX_CHANNELS`] since it's indexed by output port, not RC channel.
const PWM_TABLE_CHANNELS: usize = 32;

fn write_v1_trailer(out: &mut [u8]) {
    out[0..4].copy_from_slice(&[0u8; 4]); // NewPortTypes[4]
    for ch in 0..PWM_TABLE_CHANNELS {
        let bytes = PWM_FREQUENCY_V1.to_le_bytes();
        out[4 + ch * 2] = bytes[0];
        out[4 + ch * 2 + 1] = bytes[1];
    }
    out[4 + PWM_TABLE_CHANNELS * 2..4 + PWM_TABLE_CHANNELS * 2 + 4].copy_from_slice(&0u32.to_le_bytes()); // Synchronized
}

/// Build the config payload for whichever layout `model`'s [`PhyMode`]
/// selects. See [`PhyMode::uses_config_v1`].
pub fn build(model: &impl ModelView) -> ConfigPayload {
    if model.phy_mode().uses_config_v1() {
        let mut out = [0u8; CONFIG_V1_LEN];
        write_common_header(&mut out[..44], model, VERSION_V1);
        write_v1_trailer(&mut out[44..]);
        ConfigPayload::V1(out)
    } else {
        let mut out = [0u8; CONFIG_V0_LEN];
        write_common_header(&mut out[..44], model, VERSION_V0);
        write_v0_trailer(&mut out[44..]);
        ConfigPayload::V0(out)
    }
}
