//! Abstract transport contract, plus the two concrete sinks this crate ships.
//!
//! The transport is a borrow, not a member: `Driver::tick` takes
//! `&mut impl ByteSink` each call, the same way an `Interface` is held by
//! the struct it serves without owning the caller's notion of "when to
//! flush".

/// Abstract byte sink the driver writes outbound frames into, and the
/// contract the mixer-scheduler-driven caller flushes out to the wire.
///
/// Re-send semantics rely on the sink *not* clearing its buffer between
/// `reset()` calls on its own; the driver only calls [`Self::reset`]
/// when it is about to build a new frame. A retried tick (operation state
/// still `AwaitingResponse`, retry budget remaining) calls none of these
/// methods at all, so whatever the sink last [`Self::flush`]ed is
/// retransmitted verbatim by the transport underneath it.
pub trait ByteSink {
    type Error;

    /// Append one byte to the outbound buffer.
    fn push(&mut self, b: u8) -> Result<(), Self::Error>;

    /// Discard any buffered bytes and start accumulating a new frame.
    fn reset(&mut self);

    /// Hand the buffered bytes to the transport for sending. Called once
    /// per emitted frame, after the frame's closing `END` byte.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Bytes currently buffered.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Placeholder sink for the one-way (multicast) pulse-mode path. The
/// original's `isConnectedMulticast()` is unconditionally `false`, so this
/// path is unreachable in practice; it is kept, per spec, as a dead-but-
/// present branch rather than deleted outright. A real pulse-mode transport
/// would encode frame bytes into a PPM/PWM pulse train instead of raw UART
/// octets; that encoding is out of this crate's scope (see spec §1).
#[derive(Default)]
pub struct PulseModeSink;

impl ByteSink for PulseModeSink {
    type Error = core::convert::Infallible;

    fn push(&mut self, _b: u8) -> Result<(), Self::Error> {
        unreachable!("multicast/pulse-mode failsafe path is currently dead code upstream")
    }

    fn reset(&mut self) {}

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn len(&self) -> usize {
        0
    }
}

/// Fixed-capacity sink backing a real half-duplex serial transport (hardware
/// UART or soft-serial bit-banging), sized to the largest frame this
/// protocol ever emits (V1 config payload, 116 bytes, worst-case escaped).
pub struct FrameBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }
}

impl<const N: usize> FrameBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Buffer-overflow signal: the frame being built exceeded the sink's fixed
/// capacity.
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub struct Overflow;

impl<const N: usize> ByteSink for FrameBuffer<N> {
    type Error = Overflow;

    fn push(&mut self, b: u8) -> Result<(), Self::Error> {
        if self.len >= N {
            defmt::warn!("frame buffer overflow at capacity {}", N);
            return Err(Overflow);
        }
        self.buf[self.len] = b;
        self.len += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.len = 0;
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // The transport reads `as_slice()` after this call; nothing to do
        // here beyond leaving the buffer intact for it to read.
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(feature = "hal-serial")]
pub mod hal_serial {
    //! Thin adapter over a blocking `embedded-hal` serial writer, for boards
    //! that expose the external/internal module UART directly (mirrors the
    //! teacher crate's `hal`-feature-gated concrete transport).
    use super::ByteSink;
    use embedded_hal::serial::Write;

    pub struct HalUsartSink<W> {
        writer: W,
    }

    impl<W> HalUsartSink<W> {
        pub fn new(writer: W) -> Self {
            Self { writer }
        }
    }

    impl<W: Write<u8>> ByteSink for HalUsartSink<W> {
        type Error = W::Error;

        fn push(&mut self, b: u8) -> Result<(), Self::Error> {
            nb::block!(self.writer.write(b))
        }

        fn reset(&mut self) {}

        fn flush(&mut self) -> Result<(), Self::Error> {
            nb::block!(self.writer.flush())
        }

        fn len(&self) -> usize {
            // Byte-at-a-time blocking writes have no buffer to report on.
            0
        }
    }
}
