//! Protocol core for the AFHDS3 transmitter/RF-module link: a byte-in,
//! byte-out state machine that speaks the SLIP-framed request/response
//! wire protocol used between a transmitter's mixer/host side and an
//! AFHDS3 RF module, independent of any particular UART or pulse-output
//! peripheral.
//!
//! The driver is deliberately transport- and model-agnostic: the host
//! drives it with a tick (see [`Driver::tick`]) and a byte feed (see
//! [`Driver::feed_byte`]), and supplies its configuration through a
//! borrowed [`ModelView`] and a telemetry callback through a borrowed
//! [`SensorSink`] rather than this crate reaching into host globals.
#![cfg_attr(not(test), no_std)]

mod channels;
mod codec;
mod config;
mod frame;
mod queue;
mod shared;
mod state_machine;
mod telemetry;
mod transport;

pub use queue::QueuedCommand;
pub use shared::{
    CommandResult, DriverError, FailsafeMode, ModelView, ModuleState, ModuleVersion, PhyMode,
    PowerSource, RequestedMode, SensorSink,
};
pub use transport::{ByteSink, FrameBuffer, Overflow, PulseModeSink};

use frame::FrameBuilder;
use queue::CommandQueue;
use shared::{CmdResult, Command, FrameType, ModuleMode, OperationState};
use state_machine::{Action, Scheduler};

/// Largest payload this crate ever marshals into a single outbound frame
/// (header + 18 channels worth of `i16` samples).
const MAX_OUTBOUND_PAYLOAD: usize = 2 + shared::MAX_CHANNELS * 2;

/// Sequence counter's reset value (spec §3, `clearFrameData`).
const INITIAL_SEQ: u8 = 1;

/// One module slot's full protocol state. A host running several module
/// slots (e.g. internal + external RF) owns one `Driver` per slot.
pub struct Driver {
    module_state: ModuleState,
    operation_state: OperationState,
    seq: u8,
    last_mode_request: Option<ModuleMode>,
    scheduler: Scheduler,
    queue: CommandQueue,
    reassembler: frame::Reassembler,
    version: ModuleVersion,
    last_command_result: CommandResult,
    power_source: PowerSource,
    stopped: bool,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub const fn new() -> Self {
        Self {
            module_state: ModuleState::NotReady,
            operation_state: OperationState::Unknown,
            seq: INITIAL_SEQ,
            last_mode_request: None,
            scheduler: Scheduler::new(),
            queue: CommandQueue::new(),
            reassembler: frame::Reassembler::new(),
            version: ModuleVersion {
                product: 0,
                hardware: 0,
                bootloader: 0,
                firmware: 0,
                rf: 0,
            },
            last_command_result: CommandResult {
                command: 0,
                result: 0,
                response_len: 0,
            },
            power_source: PowerSource::Unknown,
            stopped: false,
        }
    }

    /// (Re-)start the driver: clears transient session state (module state,
    /// operation state, retry budget, sequence counter) but keeps the
    /// host-facing observability fields (version, last command result)
    /// since they describe the last module actually seen, which remains
    /// useful until overwritten. Mirrors the original's `clearFrameData`.
    pub fn init(&mut self) {
        self.stopped = false;
        self.module_state = ModuleState::NotReady;
        self.operation_state = OperationState::Idle;
        self.seq = INITIAL_SEQ;
        self.last_mode_request = None;
        self.scheduler.reset_for_new_session();
    }

    /// Tear down: the driver stops transmitting until [`Self::init`] is
    /// called again. Mirrors the original's `deinit`/`stop` pair; kept
    /// distinct from `stop` in case a future caller wants to free other
    /// resources on teardown versus a temporary pause.
    pub fn deinit(&mut self) {
        self.stop();
    }

    /// Pause transmission without resetting session state; [`Self::tick`]
    /// becomes a no-op until [`Self::init`] runs again.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Human-readable module status, for host UI display.
    pub fn status_text(&self) -> &'static str {
        self.module_state.status_text()
    }

    pub fn power_source(&self) -> PowerSource {
        self.power_source
    }

    /// Module run power, as last reported. The request path that would
    /// populate this beyond the default is disabled upstream (see
    /// `DESIGN.md`, OQ-2), so this always reads zero; kept as a stable API
    /// surface for callers expecting it.
    pub fn actual_run_power(&self) -> u8 {
        0
    }

    pub fn last_command_result(&self) -> CommandResult {
        self.last_command_result
    }

    pub fn version(&self) -> ModuleVersion {
        self.version
    }

    pub fn module_state(&self) -> ModuleState {
        self.module_state
    }

    /// Queue a host-originated `SEND_COMMAND` sub-command for the next idle
    /// tick to send. Silently dropped if the queue (capacity 8) is already
    /// full.
    pub fn enqueue_command(&mut self, sub_command: u8, args: &[u8]) {
        let n = args.len().min(7);
        let mut payload = [0u8; 8];
        payload[0] = sub_command;
        payload[1..1 + n].copy_from_slice(&args[..n]);
        self.queue.enqueue(QueuedCommand {
            command: Command::SendCommand as u8,
            frame_type: FrameType::ReqSetExpectAck as u8,
            payload,
            payload_len: (1 + n) as u8,
            seq_override: None,
        });
    }

    /// Take and post-increment the outbound sequence counter (spec §3: "SEQ
    /// equals the stored counter at the moment of emission; counter
    /// increments after emission").
    fn take_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Periodic driver entry point: decide what (if anything) to transmit
    /// this tick, and do so. Callers invoke this at a fixed cadence (the
    /// mixer scheduler's tick), not per-byte.
    pub fn tick<S: ByteSink, M: ModelView>(
        &mut self,
        sink: &mut S,
        model: &M,
    ) -> Result<(), DriverError<S::Error>> {
        if self.stopped {
            return Ok(());
        }

        // Step 3 (spec §4.5): an unknown operation state (only possible
        // before the first `init()`) normalizes to NOT_READY/Idle before
        // the rest of the decision table runs.
        if self.operation_state == OperationState::Unknown {
            self.module_state = ModuleState::NotReady;
            self.operation_state = OperationState::Idle;
        }

        let previous_operation_state = self.operation_state;
        let action = self.scheduler.decide(
            self.module_state,
            self.operation_state,
            model.requested_mode(),
            &mut self.queue,
        );

        match action {
            Action::None => {}
            Action::Resend => {
                defmt::trace!("retrying outstanding request");
                // Transport retains whatever it last flushed; nothing to
                // rebuild or re-send here.
            }
            Action::ModuleReady => {
                if previous_operation_state == OperationState::AwaitingResponse {
                    defmt::warn!("retries exhausted, regressing to NOT_READY");
                    self.module_state = ModuleState::NotReady;
                }
                defmt::debug!("requesting MODULE_READY");
                let seq = self.take_seq();
                FrameBuilder::write(sink, FrameType::ReqGetData, Command::ModuleReady, seq, &[])?;
                self.operation_state = OperationState::AwaitingResponse;
            }
            Action::ModuleState => {
                let seq = self.take_seq();
                FrameBuilder::write(sink, FrameType::ReqGetData, Command::ModuleState, seq, &[])?;
                self.operation_state = OperationState::AwaitingResponse;
            }
            Action::GetConfig => {
                let seq = self.take_seq();
                FrameBuilder::write(sink, FrameType::ReqGetData, Command::ModuleGetConfig, seq, &[])?;
                self.operation_state = OperationState::AwaitingResponse;
            }
            Action::SetConfig => {
                let payload = config::build(model);
                let seq = self.take_seq();
                FrameBuilder::write(
                    sink,
                    FrameType::ReqSetExpectData,
                    Command::ModuleSetConfig,
                    seq,
                    payload.as_bytes(),
                )?;
                self.operation_state = OperationState::AwaitingResponse;
            }
            Action::ModuleVersion => {
                let seq = self.take_seq();
                FrameBuilder::write(sink, FrameType::ReqGetData, Command::ModuleVersion, seq, &[])?;
                self.operation_state = OperationState::AwaitingResponse;
            }
            Action::ModuleModeDirect(mode) => {
                defmt::debug!("requesting module mode {} directly", mode);
                self.last_mode_request = Some(mode);
                let seq = self.take_seq();
                FrameBuilder::write(
                    sink,
                    FrameType::ReqSetExpectData,
                    Command::ModuleMode,
                    seq,
                    &[mode as u8],
                )?;
                self.operation_state = OperationState::AwaitingResponse;
            }
            Action::Dequeued(cmd) => {
                let seq = match cmd.seq_override {
                    Some(seq) => seq,
                    None => self.take_seq(),
                };
                if cmd.command == Command::ModuleMode as u8 {
                    self.last_mode_request = ModuleMode::from_wire(cmd.payload[0]);
                }
                let payload_len = cmd.payload_len as usize;
                FrameBuilder::write_raw(sink, unsafe_frame_type(cmd.frame_type), cmd.command, seq, &cmd.payload[..payload_len])?;
                self.operation_state = frame_type_post_emit(cmd.frame_type);
            }
            Action::Channels => {
                let mut payload = [0u8; MAX_OUTBOUND_PAYLOAD];
                let len = channels::write_channels_frame(model, &mut payload);
                let seq = self.take_seq();
                FrameBuilder::write(
                    sink,
                    FrameType::ReqSetNoResp,
                    Command::ChannelsFailsafeData,
                    seq,
                    &payload[..len],
                )?;
                self.operation_state = OperationState::Idle;
            }
            Action::UnicastFailsafe => {
                let mut payload = [0u8; 39];
                channels::write_unicast_failsafe_command(model, &mut payload);
                let seq = self.take_seq();
                FrameBuilder::write(sink, FrameType::ReqSetNoResp, Command::SendCommand, seq, &payload)?;
                self.operation_state = OperationState::Idle;
            }
            Action::MulticastFailsafe => {
                // Unreachable today: `is_connected_multicast` is always
                // false (spec §9). Kept for parity with the original's
                // dead-but-present branch.
                let mut payload = [0u8; MAX_OUTBOUND_PAYLOAD];
                let len = channels::write_multicast_failsafe_frame(model, &mut payload);
                let seq = self.take_seq();
                FrameBuilder::write(
                    sink,
                    FrameType::ReqSetNoResp,
                    Command::ChannelsFailsafeData,
                    seq,
                    &payload[..len],
                )?;
                self.operation_state = OperationState::Idle;
            }
        }

        Ok(())
    }

    /// Feed one raw received byte into the reassembler; dispatches and
    /// processes a complete, CRC-valid frame the moment it closes, including
    /// handing any `TELEMETRY_DATA` payload to `sensors`. Callers invoke this
    /// from the transport's RX path (interrupt or polled), independently of
    /// and more often than [`Self::tick`].
    pub fn feed_byte(&mut self, b: u8, sensors: &mut impl SensorSink) {
        if self.stopped {
            return;
        }
        // Copy the closed frame out of the reassembler's buffer before
        // dispatching: dispatch only needs the queue and the sensor sink, but
        // keeping this split avoids holding a borrow of `self.reassembler`
        // across the dispatch call.
        let mut local = [0u8; frame::MAX_FRAME_BYTES];
        let len = match self.reassembler.feed_byte(b) {
            Some(f) => {
                let len = f.len();
                local[..len].copy_from_slice(f);
                len
            }
            None => return,
        };
        let Some(parsed) = frame::validate(&local[..len]) else {
            return;
        };
        self.dispatch(parsed, sensors);
    }

    /// Process one validated inbound frame: queue an ack if it demands one,
    /// update module/version/command-result state from a response, and
    /// demux a `TELEMETRY_DATA` payload to `sensors`.
    fn dispatch(&mut self, parsed: frame::ParsedFrame<'_>, sensors: &mut impl SensorSink) {
        // A module-initiated request expecting an ack gets one queued
        // immediately; the driver emits it on its next idle tick (spec
        // §4.3, §4.4 — queue-based, not written inline here).
        if parsed.frame_type == FrameType::ReqSetExpectAck as u8 {
            defmt::trace!("queueing ack for module-initiated command {:#x} seq {}", parsed.command, parsed.seq);
            self.queue.enqueue_ack(FrameType::RespAck as u8, parsed.command, parsed.seq);
        }

        if parsed.command == Command::TelemetryData as u8 {
            telemetry::demux(parsed.payload, sensors);
            return;
        }

        if parsed.frame_type != FrameType::RespData as u8 && parsed.frame_type != FrameType::RespAck as u8 {
            return;
        }

        self.operation_state = OperationState::Idle;

        match parsed.command {
            c if c == Command::ModuleReady as u8 => {
                if parsed.payload.first() == Some(&2) {
                    defmt::debug!("module ready");
                    self.module_state = ModuleState::Ready;
                } else {
                    self.module_state = ModuleState::NotReady;
                }
            }
            c if c == Command::ModuleState as u8 => {
                if let Some(&byte) = parsed.payload.first() {
                    let new_state = ModuleState::from_wire(byte);
                    if new_state != self.module_state {
                        defmt::debug!("module state {} -> {}", self.module_state, new_state);
                    }
                    self.module_state = new_state;
                }
            }
            c if c == Command::ModuleMode as u8 => {
                let result = parsed.payload.first().copied().and_then(CmdResult::from_wire);
                if result != Some(CmdResult::Success) {
                    self.module_state = ModuleState::NotReady;
                } else if self.last_mode_request == Some(ModuleMode::Run) {
                    self.queue.enqueue(QueuedCommand {
                        command: Command::ModuleGetConfig as u8,
                        frame_type: FrameType::ReqGetData as u8,
                        payload: [0; 8],
                        payload_len: 0,
                        seq_override: None,
                    });
                    self.queue.enqueue(QueuedCommand {
                        command: Command::ModuleState as u8,
                        frame_type: FrameType::ReqGetData as u8,
                        payload: [0; 8],
                        payload_len: 0,
                        seq_override: None,
                    });
                }
            }
            c if c == Command::ModuleSetConfig as u8 => {
                let result = parsed.payload.first().copied().and_then(CmdResult::from_wire);
                if result != Some(CmdResult::Success) {
                    self.module_state = ModuleState::NotReady;
                }
            }
            c if c == Command::ModuleGetConfig as u8 => {
                // Cached config round-trip is observability only in this
                // port: the driver always rebuilds the config payload from
                // `ModelView` rather than mutating a cached copy.
                defmt::trace!("module config read back, {} bytes", parsed.payload.len());
            }
            c if c == Command::CommandResult as u8 => {
                if parsed.payload.len() >= 4 {
                    self.last_command_result = CommandResult {
                        command: u16::from_le_bytes([parsed.payload[0], parsed.payload[1]]),
                        result: parsed.payload[2],
                        response_len: parsed.payload[3],
                    };
                    defmt::trace!(
                        "command result: command={:#x} result={:#x}",
                        self.last_command_result.command,
                        self.last_command_result.result
                    );
                }
            }
            c if c == Command::ModuleVersion as u8 => {
                if parsed.payload.len() >= 20 {
                    let mut bytes = [0u8; 20];
                    bytes.copy_from_slice(&parsed.payload[..20]);
                    self.version = ModuleVersion::from_payload(&bytes);
                }
            }
            _ => {
                defmt::trace!("ignoring unknown command {:#x}", parsed.command);
            }
        }
    }
}

fn unsafe_frame_type(byte: u8) -> FrameType {
    FrameType::from_wire(byte).unwrap_or(FrameType::ReqSetNoResp)
}

fn frame_type_post_emit(byte: u8) -> OperationState {
    FrameType::from_wire(byte).map(FrameType::post_emit_state).unwrap_or(OperationState::Idle)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeModel {
        phy_mode: PhyMode,
        requested_mode: RequestedMode,
        failsafe_mode: FailsafeMode,
    }

    impl ModelView for FakeModel {
        fn phy_mode(&self) -> PhyMode {
            self.phy_mode
        }
        fn emi_standard(&self) -> u8 {
            0
        }
        fn telemetry_enabled(&self) -> bool {
            true
        }
        fn requested_mode(&self) -> RequestedMode {
            self.requested_mode
        }
        fn channels_start(&self) -> u8 {
            0
        }
        fn channels_count(&self) -> u8 {
            8
        }
        fn failsafe_mode(&self) -> FailsafeMode {
            self.failsafe_mode
        }
        fn channel_value(&self, _channel: u8) -> i16 {
            0
        }
        fn failsafe_channel_value(&self, _channel: u8) -> i16 {
            0
        }
    }

    #[derive(Default)]
    struct NullSink;
    impl SensorSink for NullSink {
        fn sensor(&mut self, _record: &[u8], _sensor_type: u8) {}
    }

    #[derive(Default)]
    struct RecordingSink {
        records: std::vec::Vec<(std::vec::Vec<u8>, u8)>,
    }
    impl SensorSink for RecordingSink {
        fn sensor(&mut self, record: &[u8], sensor_type: u8) {
            self.records.push((record.to_vec(), sensor_type));
        }
    }

    fn model() -> FakeModel {
        FakeModel {
            phy_mode: PhyMode::ClassicFlcr1_18Ch,
            requested_mode: RequestedMode::Normal,
            failsafe_mode: FailsafeMode::Hold,
        }
    }

    fn loop_back(driver: &mut Driver, sink: &mut FrameBuffer<256>) {
        let bytes: std::vec::Vec<u8> = sink.as_slice().to_vec();
        let mut sensors = NullSink;
        for b in bytes {
            driver.feed_byte(b, &mut sensors);
        }
    }

    #[test]
    fn cold_start_reaches_ready_and_queues_run_mode() {
        let mut driver = Driver::new();
        driver.init();
        let m = model();
        let mut sink = FrameBuffer::<256>::new();

        // MODULE_READY request, then module replies "ready" (value 2).
        driver.tick(&mut sink, &m).unwrap();
        FrameBuilder::write(&mut sink, FrameType::RespData, Command::ModuleReady, 1, &[2]).unwrap();
        loop_back(&mut driver, &mut sink);
        assert_eq!(driver.module_state(), ModuleState::Ready);

        // Next tick: run sequence fires (ModuleVersion request + queued RUN).
        driver.tick(&mut sink, &m).unwrap();
        let frame = parse_one(&sink);
        assert_eq!(frame.0, Command::ModuleVersion as u8);
    }

    #[test]
    fn retries_exhaust_and_driver_regresses_to_not_ready() {
        let mut driver = Driver::new();
        driver.init();
        let m = model();
        let mut sink = FrameBuffer::<256>::new();

        driver.tick(&mut sink, &m).unwrap();
        assert_eq!(driver.module_state(), ModuleState::NotReady);

        for _ in 0..shared::MAX_RETRIES {
            driver.tick(&mut sink, &m).unwrap();
        }
        driver.tick(&mut sink, &m).unwrap();
        assert_eq!(driver.module_state(), ModuleState::NotReady);
    }

    #[test]
    fn command_result_is_cached() {
        let mut driver = Driver::new();
        driver.init();
        driver.enqueue_command(5, &[0xAA]);

        let mut bytes = [0u8; 4];
        bytes[0..2].copy_from_slice(&7u16.to_le_bytes());
        bytes[2] = CmdResult::Success as u8;
        bytes[3] = 0;

        let mut sink = FrameBuffer::<256>::new();
        FrameBuilder::write(&mut sink, FrameType::RespData, Command::CommandResult, 1, &bytes).unwrap();
        loop_back(&mut driver, &mut sink);

        assert_eq!(driver.last_command_result().command, 7);
        assert_eq!(driver.last_command_result().result, CmdResult::Success as u8);
    }

    #[test]
    fn stop_suppresses_further_transmission() {
        let mut driver = Driver::new();
        driver.init();
        driver.stop();
        let m = model();
        let mut sink = FrameBuffer::<256>::new();
        driver.tick(&mut sink, &m).unwrap();
        assert!(sink.as_slice().is_empty());
    }

    #[test]
    fn ack_for_module_initiated_request_is_deferred_to_next_tick() {
        let mut driver = Driver::new();
        driver.init();
        driver.module_state = ModuleState::SyncDone;
        driver.operation_state = OperationState::Idle;
        let m = model();

        let mut incoming = FrameBuffer::<256>::new();
        FrameBuilder::write_raw(&mut incoming, FrameType::ReqSetExpectAck, 0x30, 7, &[]).unwrap();
        let mut sensors = NullSink;
        for &b in incoming.as_slice().to_vec().iter() {
            driver.feed_byte(b, &mut sensors);
        }

        let mut sink = FrameBuffer::<256>::new();
        // No ack written inline: the driver only emits it on its next tick.
        assert!(sink.as_slice().is_empty());

        driver.tick(&mut sink, &m).unwrap();
        let (command, seq, frame_type) = parse_one_full(&sink);
        assert_eq!(command, 0x30);
        assert_eq!(seq, 7);
        assert_eq!(frame_type, FrameType::RespAck as u8);
    }

    #[test]
    fn duplicate_ack_requests_are_deduplicated() {
        let mut driver = Driver::new();
        driver.init();
        let mut sink = FrameBuffer::<256>::new();

        FrameBuilder::write_raw(&mut sink, FrameType::ReqSetExpectAck, 0x30, 7, &[]).unwrap();
        let first = sink.as_slice().to_vec();
        FrameBuilder::write_raw(&mut sink, FrameType::ReqSetExpectAck, 0x30, 7, &[]).unwrap();
        let second = sink.as_slice().to_vec();

        let mut sensors = NullSink;
        for b in first {
            driver.feed_byte(b, &mut sensors);
        }
        for b in second {
            driver.feed_byte(b, &mut sensors);
        }

        assert_eq!(driver.queue.peek().map(|c| c.seq_override), Some(Some(7)));
        driver.queue.pop();
        assert!(driver.queue.peek().is_none());
    }

    #[test]
    fn telemetry_data_frame_reaches_sensor_sink_through_feed_byte() {
        let mut driver = Driver::new();
        driver.init();

        let payload = [0x22, 0x04, 0xA0, 0x11, 0x22];
        let mut incoming = FrameBuffer::<256>::new();
        FrameBuilder::write_raw(&mut incoming, FrameType::ReqSetExpectAck, Command::TelemetryData as u8, 3, &payload).unwrap();

        let mut sensors = RecordingSink::default();
        for &b in incoming.as_slice().to_vec().iter() {
            driver.feed_byte(b, &mut sensors);
        }

        assert_eq!(sensors.records, std::vec![(std::vec![0xA0, 0x11, 0x22, 0x00], 0xAA)]);

        // It also enqueues an ack, since the frame arrived as REQ_SET_EXPECT_ACK.
        assert_eq!(driver.queue.peek().map(|c| c.seq_override), Some(Some(3)));
    }

    fn parse_one(sink: &FrameBuffer<256>) -> (u8, u8) {
        let mut r = frame::Reassembler::new();
        let mut out = None;
        for &b in sink.as_slice() {
            if let Some(f) = r.feed_byte(b) {
                out = Some(f.to_vec());
            }
        }
        let bytes = out.expect("a frame should have closed");
        let parsed = frame::validate(&bytes).expect("frame should validate");
        (parsed.command, parsed.seq)
    }

    fn parse_one_full(sink: &FrameBuffer<256>) -> (u8, u8, u8) {
        let mut r = frame::Reassembler::new();
        let mut out = None;
        for &b in sink.as_slice() {
            if let Some(f) = r.feed_byte(b) {
                out = Some(f.to_vec());
            }
        }
        let bytes = out.expect("a frame should have closed");
        let parsed = frame::validate(&bytes).expect("frame should validate");
        (parsed.command, parsed.seq, parsed.frame_type)
    }
}
