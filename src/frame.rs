//! Frame marshalling: build outbound request frames and reassemble/validate
//! inbound ones. Wire shape: `START ADDR SEQ TYPE CMD payload... CRC START`
//! (the delimiter byte both opens and closes a frame, per [`crate::codec`]);
//! there is no explicit length field, since SLIP framing already delimits
//! the frame.
//!
//! CRC law: sum (wrapping) every unescaped byte from `ADDR` through the last
//! payload byte, then XOR the sum with `0xFF`.

use crate::codec::{self, DecodeEvent, Decoder};
use crate::shared::{Command, FRAME_ADDRESS, FRAME_DELIM, FrameType};
use crate::transport::ByteSink;

/// Largest payload this crate ever marshals (the V1 config frame, 116 bytes).
pub const MAX_PAYLOAD: usize = 120;
/// Header (`ADDR`, `SEQ`, `TYPE`, `CMD`) + trailing `CRC`, around a payload.
const FRAME_OVERHEAD: usize = 5;
/// Largest complete frame body (`ADDR` through `CRC`) a caller may need to
/// copy out of a [`Reassembler`] before handing it to [`validate`].
pub const MAX_FRAME_BYTES: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

/// Builds and emits outbound frames.
pub struct FrameBuilder;

impl FrameBuilder {
    /// Marshal and send one frame: resets `sink`, writes the escaped body
    /// and CRC, then flushes. `payload.len()` must fit in a `u8`; callers
    /// violating that get [`crate::shared::DriverError::PayloadTooLarge`]
    /// from the caller that owns the `Result`, since this function only
    /// speaks the sink's own error type.
    pub fn write<S: ByteSink>(
        sink: &mut S,
        frame_type: FrameType,
        command: Command,
        seq: u8,
        payload: &[u8],
    ) -> Result<(), S::Error> {
        Self::write_raw(sink, frame_type, command as u8, seq, payload)
    }

    /// Same as [`Self::write`], but for the rarer case of echoing back a
    /// command id read off the wire rather than one of our own
    /// [`Command`] variants (e.g. acking a module-initiated request).
    pub fn write_raw<S: ByteSink>(
        sink: &mut S,
        frame_type: FrameType,
        command: u8,
        seq: u8,
        payload: &[u8],
    ) -> Result<(), S::Error> {
        sink.reset();
        sink.push(FRAME_DELIM)?;

        let mut crc = 0u8;
        codec::encode_byte(sink, &mut crc, FRAME_ADDRESS)?;
        codec::encode_byte(sink, &mut crc, seq)?;
        codec::encode_byte(sink, &mut crc, frame_type as u8)?;
        codec::encode_byte(sink, &mut crc, command)?;
        for &b in payload {
            codec::encode_byte(sink, &mut crc, b)?;
        }

        let mut discard = 0u8;
        codec::encode_byte(sink, &mut discard, crc ^ 0xFF)?;
        sink.push(FRAME_DELIM)?;
        sink.flush()
    }
}

/// Accumulates de-escaped inbound bytes across repeated [`Self::feed_byte`]
/// calls until a frame closes. Oversized frames are discarded wholesale
/// rather than truncated, matching a fixed-size receive buffer's natural
/// failure mode.
pub struct Reassembler {
    decoder: Decoder,
    buf: [u8; MAX_PAYLOAD + FRAME_OVERHEAD],
    len: usize,
    open: bool,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub const fn new() -> Self {
        Self {
            decoder: Decoder::new(),
            buf: [0; MAX_PAYLOAD + FRAME_OVERHEAD],
            len: 0,
            open: false,
        }
    }

    /// Feed one raw wire byte. Returns the closed frame's raw bytes (`ADDR`
    /// through `CRC` inclusive) once a frame completes.
    pub fn feed_byte(&mut self, b: u8) -> Option<&[u8]> {
        match self.decoder.decode_byte(b, self.open) {
            DecodeEvent::FrameStart => {
                self.len = 0;
                self.open = true;
                None
            }
            DecodeEvent::FrameEnd => {
                self.open = false;
                (self.len >= 5).then(|| &self.buf[..self.len])
            }
            DecodeEvent::Byte(byte) => {
                if self.open {
                    if self.len < self.buf.len() {
                        self.buf[self.len] = byte;
                        self.len += 1;
                    } else {
                        // Overrun: the frame in progress cannot be CRC-valid
                        // once truncated, so drop it wholesale and wait for
                        // the next delimiter.
                        self.open = false;
                        self.len = 0;
                    }
                }
                None
            }
            DecodeEvent::Pending => None,
        }
    }
}

/// A CRC-validated inbound frame, borrowed from the [`Reassembler`]'s
/// internal buffer.
#[derive(Clone, Copy, Debug)]
pub struct ParsedFrame<'a> {
    pub seq: u8,
    pub frame_type: u8,
    pub command: u8,
    pub payload: &'a [u8],
}

/// Validate a closed frame's address and CRC, and split it into
/// seq/type/command/payload. Returns `None` for any malformed frame: wrong
/// address or a failed checksum. A malformed frame is silently dropped, as
/// if it had never arrived (spec §4, "CRC mismatch").
pub fn validate(bytes: &[u8]) -> Option<ParsedFrame<'_>> {
    if bytes.len() < 5 {
        return None;
    }
    let (body, crc_tail) = bytes.split_at(bytes.len() - 1);
    let crc_byte = crc_tail[0];
    let sum = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    if sum ^ 0xFF != crc_byte {
        defmt::warn!("dropping frame with bad CRC: expected {:#x} got {:#x}", sum ^ 0xFF, crc_byte);
        return None;
    }

    let address = body[0];
    let seq = body[1];
    let frame_type = body[2];
    let command = body[3];
    let payload = &body[4..];
    if address != FRAME_ADDRESS {
        defmt::warn!("dropping malformed frame: address={:#x}", address);
        return None;
    }

    defmt::trace!(
        "frame parsed: seq={} type={:#x} command={:#x} len={}",
        seq,
        frame_type,
        command,
        payload.len()
    );
    Some(ParsedFrame {
        seq,
        frame_type,
        command,
        payload,
    })
}
