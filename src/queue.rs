//! Bounded command FIFO: the 8-slot queue the driver defers outbound
//! requests and module-initiated acks into, drained one entry per idle tick
//! (spec §3, §4.4). Grounded on the same single-writer/single-reader index
//! discipline as a DMA ring buffer: the producer only ever advances `tail`,
//! the consumer only ever advances `head`, and each publishes its new index
//! with a `Release` store matched by the other side's `Acquire` load.
//!
//! A single core tick-driven loop is the only realistic caller today, so the
//! fences are stricter than strictly necessary — kept anyway, since an
//! interrupt-context producer (an ack enqueued from the byte-parse path
//! while a scheduled tick is mid-flight) is the likely next caller and the
//! discipline costs nothing correctness-wise once paid.

use core::sync::atomic::{AtomicUsize, Ordering, fence};

/// Queue capacity. Must be a power of two (index wrap uses a mask).
const CAPACITY: usize = 8;
const MASK: usize = CAPACITY - 1;

/// One deferred outbound request: either a host sub-command (`SEND_COMMAND`),
/// a mode-change request queued by the state machine (`MODULE_MODE`), or an
/// ack for a module-initiated request. Mirrors spec §3's queue entry shape
/// (`command, frame_type, payload, seq_override, seq`).
#[derive(Clone, Copy, Default, defmt::Format, Debug, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Wire command id (a [`crate::shared::Command`] discriminant, or an
    /// unrecognized id echoed back verbatim for an ack).
    pub command: u8,
    /// Wire frame type ([`crate::shared::FrameType`] discriminant) to send
    /// this entry with.
    pub frame_type: u8,
    pub payload: [u8; 8],
    pub payload_len: u8,
    /// `Some(seq)` for an ack echoing a peer's sequence number; `None` to
    /// use the driver's own outbound sequence counter.
    pub seq_override: Option<u8>,
}

/// Fixed-capacity single-producer/single-consumer command ring. Enqueue on a
/// full queue is a silent drop (spec §4.4): there is no backpressure
/// signal to the host, mirroring the original's fire-and-forget FIFO.
pub struct CommandQueue {
    slots: [QueuedCommand; CAPACITY],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub const fn new() -> Self {
        const EMPTY: QueuedCommand = QueuedCommand {
            command: 0,
            frame_type: 0,
            payload: [0; 8],
            payload_len: 0,
            seq_override: None,
        };
        Self {
            slots: [EMPTY; CAPACITY],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    fn count(&self, head: usize, tail: usize) -> usize {
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.count(head, tail) == 0
    }

    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.count(head, tail) >= CAPACITY
    }

    /// Enqueue a command, dropping it silently if the queue is full.
    pub fn enqueue(&mut self, cmd: QueuedCommand) {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if self.count(head, tail) >= CAPACITY {
            defmt::debug!("command queue full, dropping command {:#x}", cmd.command);
            return;
        }
        self.slots[tail & MASK] = cmd;
        fence(Ordering::Release);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
    }

    /// Enqueue an ack for `command`/`seq`, but only if an identical ack
    /// isn't already sitting at the head (the original de-duplicates against
    /// `commandFifo[getIndex]` — the next entry due to be sent, not the most
    /// recently queued one — rather than flooding the module with repeats;
    /// spec §4.4, §8 scenario 5).
    pub fn enqueue_ack(&mut self, frame_type: u8, command: u8, seq: u8) {
        let cmd = QueuedCommand {
            command,
            frame_type,
            payload: [0; 8],
            payload_len: 0,
            seq_override: Some(seq),
        };
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if self.count(head, tail) > 0 {
            let next = &self.slots[head & MASK];
            if *next == cmd {
                defmt::trace!("skipping duplicate ack for seq {}", seq);
                return;
            }
        }
        self.enqueue(cmd);
    }

    /// Look at the next command to send without removing it.
    pub fn peek(&self) -> Option<QueuedCommand> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if self.count(head, tail) == 0 {
            None
        } else {
            Some(self.slots[head & MASK])
        }
    }

    /// Remove and return the command at the head, once the driver has taken
    /// it for sending.
    pub fn pop(&mut self) -> Option<QueuedCommand> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if self.count(head, tail) == 0 {
            return None;
        }
        let cmd = self.slots[head & MASK];
        fence(Ordering::Release);
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(cmd)
    }
}
