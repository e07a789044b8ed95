//! Types and constants shared across the protocol core: wire enums, the
//! driver's public error type, and the borrowed collaborator traits the
//! driver is built against (model config, telemetry sink).

/// SLIP-style frame delimiter. Also used as the escape-sequence marker's
/// counterpart; see [`crate::codec`].
pub const FRAME_DELIM: u8 = 0xC0;
/// Escape character.
pub const ESC: u8 = 0xDB;
/// `END`, escaped.
pub const ESC_END: u8 = 0xDC;
/// `ESC`, escaped.
pub const ESC_ESC: u8 = 0xDD;

/// Fixed transmitter-side address nibble.
pub const TRANSMITTER: u8 = 0x01;
/// Fixed module-side address nibble.
pub const MODULE: u8 = 0x05;
/// `(MODULE << 4) | TRANSMITTER`, the address byte used in every frame this
/// driver emits.
pub const FRAME_ADDRESS: u8 = (MODULE << 4) | TRANSMITTER;

/// Ticks a request may be retransmitted while `AWAITING_RESPONSE` before the
/// driver gives up and regresses to `NOT_READY`.
pub const MAX_RETRIES: u8 = 5;

/// Channel count supported by the widest PHY mode; also the failsafe table
/// width.
pub const MAX_CHANNELS: usize = 18;

/// Scaled channel-value clamp (±1024 raw -> ±10240 wire).
pub const FAILSAFE_MIN: i16 = -10240;
pub const FAILSAFE_MAX: i16 = 10240;
/// Sentinel meaning "hold the receiver's last known output" in a failsafe
/// table slot.
pub const FAILSAFE_KEEP_LAST: i16 = 0x8000u16 as i16;

/// Scheduler tick count between periodic (non-channel) requests.
pub const PERIODIC_INTERVAL_TICKS: u16 = 150;

/// `CHANNELS_FAILSAFE_DATA` payload's leading mode byte: live channel data.
pub const CHANNELS_FRAME_MODE: u8 = 0x01;
/// `CHANNELS_FAILSAFE_DATA` payload's leading mode byte: one-way failsafe table.
pub const FAILSAFE_FRAME_MODE: u8 = 0x02;
/// Failsafe table width carried by the multicast (one-way) failsafe frame,
/// independent of the active PHY mode's channel count.
pub const MULTICAST_FAILSAFE_CHANNELS: u8 = 18;

/// Channel count for each [`PhyMode`], indexed by the mode's discriminant.
const PHY_MODE_CHANNELS: [u8; 5] = [18, 10, 18, 8, 12];

/// Radio PHY/channel-plan variant. Determines both the channel count and
/// which on-wire config layout (V0/V1) is used.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum PhyMode {
    ClassicFlcr1_18Ch = 0,
    ClassicFlcr6_10Ch = 1,
    RoutineFlcr1_18Ch = 2,
    RoutineFlcr6_8Ch = 3,
    RoutineLora12Ch = 4,
}

impl PhyMode {
    /// Number of RC channels this PHY mode carries.
    pub fn channel_count(self) -> u8 {
        PHY_MODE_CHANNELS[self as usize]
    }

    /// V0 config layout below this threshold, V1 at and above it.
    pub fn uses_config_v1(self) -> bool {
        (self as u8) >= (Self::RoutineFlcr1_18Ch as u8)
    }
}

/// Wire frame type. Distinguishes request direction/ack semantics.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum FrameType {
    ReqGetData = 0x01,
    ReqSetExpectData = 0x02,
    ReqSetExpectAck = 0x03,
    ReqSetNoResp = 0x05,
    RespData = 0x10,
    RespAck = 0x20,
}

impl FrameType {
    /// Types whose payload carries meaningful data (everything but a bare ack).
    pub fn carries_data(self) -> bool {
        matches!(
            self,
            Self::RespData | Self::ReqSetExpectData | Self::ReqSetExpectAck | Self::ReqSetNoResp
        )
    }

    /// Operation-state the driver enters right after emitting a frame of
    /// this type. See spec §4.2.
    pub fn post_emit_state(self) -> OperationState {
        match self {
            Self::ReqGetData | Self::ReqSetExpectData | Self::ReqSetExpectAck => {
                OperationState::AwaitingResponse
            }
            Self::ReqSetNoResp | Self::RespData | Self::RespAck => OperationState::Idle,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ReqGetData),
            0x02 => Some(Self::ReqSetExpectData),
            0x03 => Some(Self::ReqSetExpectAck),
            0x05 => Some(Self::ReqSetNoResp),
            0x10 => Some(Self::RespData),
            0x20 => Some(Self::RespAck),
            _ => None,
        }
    }
}

/// Command identifiers. `VirtualFailsafe` never appears on the wire; it is
/// a synthetic rotation entry that drives periodic failsafe emission.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum Command {
    ModuleReady = 0x01,
    ModuleState = 0x02,
    ModuleMode = 0x03,
    ModuleSetConfig = 0x04,
    ModuleGetConfig = 0x06,
    ChannelsFailsafeData = 0x07,
    TelemetryData = 0x09,
    SendCommand = 0x0C,
    CommandResult = 0x0D,
    ModuleVersion = 0x20,
    VirtualFailsafe = 0x99,
}

/// Module lifecycle state. Initial value is [`Self::NotReady`].
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum ModuleState {
    NotReady = 0x00,
    HwError = 0x01,
    Binding = 0x02,
    SyncRunning = 0x03,
    SyncDone = 0x04,
    Standby = 0x05,
    UpdatingWait = 0x06,
    UpdatingMod = 0x07,
    UpdatingRx = 0x08,
    UpdatingRxFailed = 0x09,
    RfTesting = 0x0a,
    Ready = 0x0b,
    HwTest = 0xff,
}

impl ModuleState {
    /// Decode a module-reported state byte; unknown bytes fall back to
    /// [`Self::HwTest`] rather than failing, matching the original's
    /// "anything unrecognized is treated as the catch-all test state"
    /// leniency (it indexes a status-string table clamped the same way).
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0x00 => Self::NotReady,
            0x01 => Self::HwError,
            0x02 => Self::Binding,
            0x03 => Self::SyncRunning,
            0x04 => Self::SyncDone,
            0x05 => Self::Standby,
            0x06 => Self::UpdatingWait,
            0x07 => Self::UpdatingMod,
            0x08 => Self::UpdatingRx,
            0x09 => Self::UpdatingRxFailed,
            0x0a => Self::RfTesting,
            0x0b => Self::Ready,
            _ => Self::HwTest,
        }
    }

    /// Human-readable status text, for UI display.
    pub fn status_text(self) -> &'static str {
        match self {
            Self::NotReady => "Not ready",
            Self::HwError => "HW Error",
            Self::Binding => "Binding",
            Self::SyncRunning => "Connecting",
            Self::SyncDone => "Connected",
            Self::Standby => "Standby",
            Self::UpdatingWait => "Waiting for update",
            Self::UpdatingMod => "Updating",
            Self::UpdatingRx => "Updating RX",
            Self::UpdatingRxFailed => "Updating RX failed",
            Self::RfTesting => "Testing",
            Self::Ready => "Ready",
            Self::HwTest => "HW test",
        }
    }
}

/// Transport-level operation state; orthogonal to [`ModuleState`]. Governs
/// whether the driver may emit a new frame this tick.
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug, Default)]
pub enum OperationState {
    #[default]
    Unknown,
    SendingCommand,
    AwaitingResponse,
    Idle,
}

/// Host-requested operating mode, supplied by the model config.
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum RequestedMode {
    Normal,
    Bind,
}

/// `MODULE_MODE` payload values used both to request a mode change, and
/// (for [`Self::Run`]) to remember which request is outstanding.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum ModuleMode {
    Standby = 0x01,
    Bind = 0x02,
    Run = 0x03,
    RxUpdate = 0x04,
    Unknown = 0xFF,
}

/// Command-reply result code, as carried in `MODULE_MODE`/`MODULE_SET_CONFIG`
/// response payloads.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum CmdResult {
    Failure = 0x01,
    Success = 0x02,
}

impl CmdResult {
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Failure),
            0x02 => Some(Self::Success),
            _ => None,
        }
    }
}

impl ModuleMode {
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Standby),
            0x02 => Some(Self::Bind),
            0x03 => Some(Self::Run),
            0x04 => Some(Self::RxUpdate),
            _ => None,
        }
    }
}

/// Model-level failsafe policy for a channel, mirroring the host
/// configuration store.
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum FailsafeMode {
    NoPulses,
    Hold,
    Custom,
}

/// Module version record, captured verbatim from a `MODULE_VERSION` reply.
/// Opaque to the core beyond observability.
#[derive(Clone, Copy, Default, defmt::Format, Debug)]
pub struct ModuleVersion {
    pub product: u32,
    pub hardware: u32,
    pub bootloader: u32,
    pub firmware: u32,
    pub rf: u32,
}

impl ModuleVersion {
    pub(crate) fn from_payload(payload: &[u8; 20]) -> Self {
        Self {
            product: u32::from_le_bytes(payload[0..4].try_into().unwrap()),
            hardware: u32::from_le_bytes(payload[4..8].try_into().unwrap()),
            bootloader: u32::from_le_bytes(payload[8..12].try_into().unwrap()),
            firmware: u32::from_le_bytes(payload[12..16].try_into().unwrap()),
            rf: u32::from_le_bytes(payload[16..20].try_into().unwrap()),
        }
    }
}

/// Last observed `COMMAND_RESULT` frame, kept for observability. See
/// `DESIGN.md` for why this single-slot cache exists.
#[derive(Clone, Copy, Default, defmt::Format, Debug)]
pub struct CommandResult {
    pub command: u16,
    pub result: u8,
    pub response_len: u8,
}

/// Reported power source of the module. The request path that would
/// populate this is disabled upstream (see `DESIGN.md`, OQ-2); the field
/// and its getter are kept as a hook, always reading [`Self::Unknown`].
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug, Default)]
pub enum PowerSource {
    #[default]
    Unknown,
    Internal,
    External,
}

/// Errors the driver's host-exposed operations can return synchronously.
/// Framing/CRC/timeout failures are *not* represented here — per the error
/// handling design, those recover locally and surface only through
/// [`ModuleState`] and logging, never as a `Result` to the caller.
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format, Debug)]
pub enum DriverError<E> {
    /// The transport's byte sink reported an error (e.g. a UART overrun or
    /// a pulse-mode encoder rejecting a write).
    Transport(E),
    /// A marshalled payload (config or channels frame) would not fit the
    /// frame buffer.
    PayloadTooLarge,
}

impl<E> From<E> for DriverError<E> {
    fn from(e: E) -> Self {
        Self::Transport(e)
    }
}

/// Borrowed, read-only view of the host's model/global configuration store.
/// Supplied at `init` and on every tick rather than held by pointer (see
/// `DESIGN.md`, "Pointer-to-model").
pub trait ModelView {
    /// PHY/channel-plan mode configured for this module slot.
    fn phy_mode(&self) -> PhyMode;
    /// EMI region/standard byte, passed through verbatim to the config payload.
    fn emi_standard(&self) -> u8;
    /// Whether telemetry (and therefore two-way operation) is enabled.
    fn telemetry_enabled(&self) -> bool;
    /// Host-requested operating mode (normal run vs. bind).
    fn requested_mode(&self) -> RequestedMode;
    /// First channel index included in the channel/failsafe window.
    fn channels_start(&self) -> u8;
    /// Channel count beyond the fixed 8-channel base window.
    fn channels_count(&self) -> u8;
    /// Failsafe policy in effect for the module.
    fn failsafe_mode(&self) -> FailsafeMode;
    /// Live mixer output for `channel` (range -1024..=1024).
    fn channel_value(&self, channel: u8) -> i16;
    /// Configured custom failsafe value for `channel` (range -1024..=1024).
    fn failsafe_channel_value(&self, channel: u8) -> i16;
}

/// Telemetry sink: receives decoded sensor records extracted from inbound
/// `TELEMETRY_DATA` frames. Mirrors the original's `processFlySkySensor`
/// callback.
pub trait SensorSink {
    fn sensor(&mut self, record: &[u8], sensor_type: u8);
}
