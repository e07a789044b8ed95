//! SLIP-style byte-stuffing codec: the framing layer shared by outbound
//! frame emission ([`crate::frame::FrameBuilder`]) and inbound frame
//! reassembly ([`Decoder`]).

use crate::shared::{ESC, ESC_END, ESC_ESC, FRAME_DELIM};
use crate::transport::ByteSink;

/// Push `b` onto `sink`, escaping it first if it collides with a framing
/// sentinel. Also folds `b` into `crc` (the running checksum is accumulated
/// over *unescaped* bytes, per the CRC law).
pub fn encode_byte<S: ByteSink>(sink: &mut S, crc: &mut u8, b: u8) -> Result<(), S::Error> {
    *crc = crc.wrapping_add(b);
    match b {
        FRAME_DELIM => {
            sink.push(ESC)?;
            sink.push(ESC_END)
        }
        ESC => {
            sink.push(ESC)?;
            sink.push(ESC_ESC)
        }
        _ => sink.push(b),
    }
}

/// Result of feeding one raw wire byte to [`Decoder::decode_byte`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecodeEvent {
    /// A de-escaped byte belonging to the frame in progress.
    Byte(u8),
    /// A standalone `END` that opened a new frame (buffer was empty).
    FrameStart,
    /// A standalone `END` that closed the frame in progress.
    FrameEnd,
    /// An `ESC` byte was latched; nothing to deliver yet.
    Pending,
}

/// Single-latch SLIP decoder. Holds just enough state (`esc_pending`) to
/// reassemble one byte at a time; frame reassembly into a buffer is the
/// caller's job (see [`crate::frame::Reassembler`]).
#[derive(Default)]
pub struct Decoder {
    esc_pending: bool,
}

impl Decoder {
    pub const fn new() -> Self {
        Self { esc_pending: false }
    }

    /// Feed one raw byte. `frame_open` tells the decoder whether a frame is
    /// currently being accumulated (i.e. whether the buffer is non-empty),
    /// since a standalone `END` both closes a prior frame and opens the
    /// next one.
    pub fn decode_byte(&mut self, b: u8, frame_open: bool) -> DecodeEvent {
        if b == FRAME_DELIM {
            self.esc_pending = false;
            return if frame_open {
                DecodeEvent::FrameEnd
            } else {
                DecodeEvent::FrameStart
            };
        }

        if self.esc_pending {
            self.esc_pending = false;
            let translated = match b {
                ESC_END => FRAME_DELIM,
                ESC_ESC => ESC,
                // Tolerant: deliver anything else raw rather than erroring.
                other => other,
            };
            return DecodeEvent::Byte(translated);
        }

        if b == ESC {
            self.esc_pending = true;
            return DecodeEvent::Pending;
        }

        DecodeEvent::Byte(b)
    }
}
