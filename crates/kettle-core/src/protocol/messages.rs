//! All kettle protocol message types.
//!
//! Inner frames use the byte layout below.  All multi-byte integers are
//! big-endian.
//!
//! ```text
//! [header:1][length:2][reserved:8][sequence:1][command:1][… payload …][checksum:1]
//!  0         1..3      3..11       11          12                      last
//! ```
//!
//! `length` counts every byte after the length field, checksum included, so
//! the payload is `bytes[3 .. 3 + length]`.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Header byte of every frame the controller sends.
pub const FRAME_HEADER: u8 = 0xAA;

/// Bytes 3..11 of an outbound frame: zero padding followed by the `03 B7`
/// source marker the device expects from the app.
pub const OUTBOUND_PREAMBLE: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xB7];

/// Offset of the sequence byte within a frame.
pub const SEQUENCE_OFFSET: usize = 11;

/// Offset of the command byte within a frame.
pub const COMMAND_OFFSET: usize = 12;

/// Smallest frame that still carries a command byte and a checksum.
pub const MIN_FRAME_LEN: usize = COMMAND_OFFSET + 2;

/// Literal keep-alive message.  Sent raw, not wrapped in a JSON envelope.
pub const KEEP_ALIVE: &[u8] = b"##000bKeepConnect&&";

/// `app_cmd` value carried by every request envelope.
pub const APP_CMD: &str = "62";

/// Default boil target used by [`KettleCommand::On`] callers.
pub const DEFAULT_TARGET_TEMP_C: u8 = 100;

/// Default keep-warm duration used by [`KettleCommand::On`] callers.
pub const DEFAULT_KEEP_WARM_MINS: u8 = 5;

// ── Command codes ─────────────────────────────────────────────────────────────

/// Command byte at offset 12 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandCode {
    /// Status query (outbound) or status report (inbound).
    Stat = 0x36,
    /// Start boiling.
    KettleOn = 0x39,
    /// Stop boiling / cancel keep-warm.
    KettleOff = 0x3A,
    /// Wake from standby.
    Wake = 0x41,
    Timer1 = 0x43,
    Timer2 = 0x44,
    /// Device-initiated handshake sent after the TCP session opens.
    Init = 0xA4,
}

impl TryFrom<u8> for CommandCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x36 => Ok(CommandCode::Stat),
            0x39 => Ok(CommandCode::KettleOn),
            0x3A => Ok(CommandCode::KettleOff),
            0x41 => Ok(CommandCode::Wake),
            0x43 => Ok(CommandCode::Timer1),
            0x44 => Ok(CommandCode::Timer2),
            0xA4 => Ok(CommandCode::Init),
            _ => Err(()),
        }
    }
}

// ── Kettle state ──────────────────────────────────────────────────────────────

/// Physical state reported at payload offset 14 of a STAT frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KettleState {
    NotOnBase,
    /// Reported as `1`, and used for any byte outside the known range.
    #[default]
    Unknown,
    Standby,
    Ready,
    Heating,
    KeepWarm,
}

impl From<u8> for KettleState {
    fn from(value: u8) -> Self {
        match value {
            0 => KettleState::NotOnBase,
            2 => KettleState::Standby,
            3 => KettleState::Ready,
            4 => KettleState::Heating,
            5 => KettleState::KeepWarm,
            _ => KettleState::Unknown,
        }
    }
}

/// Result code at payload offset 12 of a STAT frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusResult {
    Ok,
    Other(u8),
}

impl StatusResult {
    pub const OK_CODE: u8 = 0xC8;
}

impl From<u8> for StatusResult {
    fn from(value: u8) -> Self {
        if value == Self::OK_CODE {
            StatusResult::Ok
        } else {
            StatusResult::Other(value)
        }
    }
}

// ── Outbound intents ──────────────────────────────────────────────────────────

/// A command the controller can send to the kettle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KettleCommand {
    Query,
    Wake,
    Off,
    On {
        target_temp_c: u8,
        keep_warm_mins: u8,
    },
}

impl KettleCommand {
    /// `On` with the default 100 °C target and 5 minutes of keep-warm.
    pub fn on_default() -> Self {
        KettleCommand::On {
            target_temp_c: DEFAULT_TARGET_TEMP_C,
            keep_warm_mins: DEFAULT_KEEP_WARM_MINS,
        }
    }

    /// The command byte this intent is encoded with.
    pub fn code(&self) -> CommandCode {
        match self {
            KettleCommand::Query => CommandCode::Stat,
            KettleCommand::Wake => CommandCode::Wake,
            KettleCommand::Off => CommandCode::KettleOff,
            KettleCommand::On { .. } => CommandCode::KettleOn,
        }
    }
}

// ── Checksum policy ───────────────────────────────────────────────────────────

/// What to do with a received frame whose checksum does not match.
///
/// Devices in the field have been observed sending INIT frames with a bad
/// checksum, so the default keeps such frames and only logs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    #[default]
    Permissive,
    Strict,
}

// ── Decoded frames ────────────────────────────────────────────────────────────

/// Fields common to every decoded inner frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: u8,
    /// Declared length; always equals `payload.len()` once decoded.
    pub length: u16,
    pub sequence: u8,
    pub command: CommandCode,
    /// `bytes[3 .. 3 + length]`.  Offsets in [`StatusReport`] are relative to
    /// the start of this slice.
    pub payload: Vec<u8>,
    pub checksum: u8,
    /// Whether `checksum` matched the value computed over the received bytes.
    pub checksum_valid: bool,
}

/// Status fields decoded from a STAT frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub result: StatusResult,
    pub state: KettleState,
    pub keep_warm_seconds_remaining: u16,
    pub current_temp_c: u8,
    pub target_temp_c: u8,
    pub water_volume_ml: u16,
}

/// A received frame, specialised by command at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    Status { frame: Frame, status: StatusReport },
    /// Device handshake.  No fields beyond the common frame are known.
    Init { frame: Frame },
    /// Acks, STAT requests too short to carry a status, and any other
    /// command without a specialised payload.
    Other { frame: Frame },
}

impl DecodedMessage {
    pub fn frame(&self) -> &Frame {
        match self {
            DecodedMessage::Status { frame, .. }
            | DecodedMessage::Init { frame }
            | DecodedMessage::Other { frame } => frame,
        }
    }

    pub fn command(&self) -> CommandCode {
        self.frame().command
    }

    pub fn status(&self) -> Option<&StatusReport> {
        match self {
            DecodedMessage::Status { status, .. } => Some(status),
            _ => None,
        }
    }
}

// ── JSON envelope payloads ────────────────────────────────────────────────────

/// JSON object inside an outbound envelope.  Field order matters on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub app_cmd: String,
    pub imei: String,
    #[serde(rename = "SubDev")]
    pub sub_dev: String,
    /// Lowercase hex of the inner frame.
    pub data2: String,
}

impl RequestPayload {
    pub fn new(imei: &str, frame_hex: String) -> Self {
        Self {
            app_cmd: APP_CMD.to_string(),
            imei: imei.to_string(),
            sub_dev: String::new(),
            data2: frame_hex,
        }
    }
}

/// JSON object inside an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub wifi_cmd: String,
    #[serde(default)]
    pub imei: String,
    /// Hex of the inner frame.
    pub data3: String,
    #[serde(default)]
    pub suc: String,
    #[serde(default)]
    pub seq: String,
}
