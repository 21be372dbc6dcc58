//! Codec for the kettle's inner binary frame.
//!
//! Wire format (offsets in bytes):
//! ```text
//! [header:1][length:2][reserved:8][seq:1][cmd:1][params:N][checksum:1]
//! ```
//! `length` is big-endian and counts everything after itself, checksum
//! included.  The checksum is `0xFF - (sum of every byte except the header
//! and the checksum itself) mod 256`.
//!
//! Outbound frames are lower-case hex encoded and wrapped in a JSON request
//! envelope by [`build_command`].  Inbound frames are decoded by
//! [`decode_frame`] once the envelope layer has extracted and hex-decoded the
//! `data3` field.

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::envelope::wrap_envelope;
use crate::protocol::messages::{
    ChecksumPolicy, CommandCode, DecodedMessage, Frame, KettleCommand, KettleState,
    RequestPayload, StatusReport, StatusResult, COMMAND_OFFSET, FRAME_HEADER, MIN_FRAME_LEN,
    OUTBOUND_PREAMBLE, SEQUENCE_OFFSET,
};

/// Errors that can occur while encoding or decoding a frame or envelope.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The command byte is not one of the known [`CommandCode`]s.
    #[error("unknown command: 0x{0:02X}")]
    UnknownCommand(u8),

    /// An envelope fragment or payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The `data3` field was not valid hex.
    #[error("invalid hex in frame field: {0}")]
    InvalidHex(String),

    /// The JSON object inside an envelope could not be parsed or serialised.
    #[error("invalid envelope JSON: {0}")]
    InvalidJson(String),

    /// The declared frame length runs past the end of the received bytes.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// Strict checksum policy only.
    #[error("checksum mismatch: frame carries 0x{received:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { received: u8, computed: u8 },

    /// AES decryption of an encrypted frame failed.
    #[error("decrypt failed: {0}")]
    Decrypt(String),
}

// ── STAT payload offsets (relative to payload start) ──────────────────────────

const STAT_RESULT: usize = 12;
const STAT_STATE: usize = 14;
const STAT_KEEP_WARM: usize = 15;
const STAT_CURRENT_TEMP: usize = 17;
const STAT_TARGET_TEMP: usize = 18;
const STAT_VOLUME: usize = 19;
const STAT_PAYLOAD_MIN: usize = STAT_VOLUME + 2;

// ── Public API ────────────────────────────────────────────────────────────────

/// Computes the frame checksum over `bytes`, which must already exclude the
/// header byte and the checksum byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFF - sum
}

/// Builds the raw inner frame for `command`, checksum included.
///
/// Trailing zero bytes in each template are part of the device's fixed
/// layout and are kept as-is.
pub fn build_frame(command: KettleCommand, sequence: u8) -> Vec<u8> {
    let params: &[u8] = match command {
        KettleCommand::Query | KettleCommand::Wake | KettleCommand::Off => &[0x00, 0x00],
        KettleCommand::On {
            target_temp_c,
            keep_warm_mins,
        } => &[0x00, 0x00, 0x00, target_temp_c, keep_warm_mins, 0x00, 0x00],
    };

    // Everything after the length field: preamble, seq, cmd, params, checksum.
    let length = OUTBOUND_PREAMBLE.len() + 2 + params.len() + 1;

    let mut frame = Vec::with_capacity(3 + length);
    frame.push(FRAME_HEADER);
    frame.extend_from_slice(&(length as u16).to_be_bytes());
    frame.extend_from_slice(&OUTBOUND_PREAMBLE);
    frame.push(sequence);
    frame.push(command.code() as u8);
    frame.extend_from_slice(params);

    let sum = checksum(&frame[1..]);
    frame.push(sum);
    frame
}

/// Encodes `command` into complete envelope bytes ready to write to the
/// session socket.
///
/// The sequence number is **not** chosen here – pass the next value from a
/// [`crate::protocol::SequenceCounter`].
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] if the request object cannot be
/// serialised (only possible if serde itself fails).
///
/// # Examples
///
/// ```rust
/// use kettle_core::protocol::{build_command, KettleCommand};
///
/// let bytes = build_command(KettleCommand::Query, 0x01, "GD0-12900-35aa").unwrap();
/// assert!(bytes.starts_with(b"##"));
/// assert!(bytes.ends_with(b"&&"));
/// ```
pub fn build_command(
    command: KettleCommand,
    sequence: u8,
    imei: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let frame = build_frame(command, sequence);
    let request = RequestPayload::new(imei, hex::encode(frame));
    let json =
        serde_json::to_string(&request).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    Ok(wrap_envelope(&json))
}

/// Decodes a hex string (either case) into a typed message.
///
/// # Errors
///
/// [`ProtocolError::InvalidHex`] if `hex_frame` is not hex, otherwise any
/// error from [`decode_frame`].
pub fn decode_frame_hex(
    hex_frame: &str,
    policy: ChecksumPolicy,
) -> Result<DecodedMessage, ProtocolError> {
    let bytes = hex::decode(hex_frame.trim()).map_err(|e| ProtocolError::InvalidHex(e.to_string()))?;
    decode_frame(&bytes, policy)
}

/// Decodes raw inner-frame bytes into a [`DecodedMessage`].
///
/// STAT frames long enough to carry a status are specialised into a
/// [`StatusReport`] and INIT frames into an init marker. Every other frame,
/// including a short STAT request, becomes a generic frame.
///
/// A checksum mismatch is logged and, under [`ChecksumPolicy::Permissive`],
/// the frame is still returned with `checksum_valid = false`.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if `bytes` is too short to hold a
///   command byte and checksum.
/// - [`ProtocolError::PayloadLengthMismatch`] if the declared length runs
///   past the end of `bytes`.
/// - [`ProtocolError::UnknownCommand`] for a command byte outside
///   [`CommandCode`].
/// - [`ProtocolError::ChecksumMismatch`] under [`ChecksumPolicy::Strict`].
pub fn decode_frame(bytes: &[u8], policy: ChecksumPolicy) -> Result<DecodedMessage, ProtocolError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(ProtocolError::InsufficientData {
            needed: MIN_FRAME_LEN,
            available: bytes.len(),
        });
    }

    let length = u16::from_be_bytes([bytes[1], bytes[2]]);
    let payload_end = 3 + length as usize;
    if payload_end > bytes.len() {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: length as usize,
            available: bytes.len() - 3,
        });
    }

    let raw_command = bytes[COMMAND_OFFSET];
    let command =
        CommandCode::try_from(raw_command).map_err(|_| ProtocolError::UnknownCommand(raw_command))?;

    let last = bytes.len() - 1;
    let received = bytes[last];
    let computed = checksum(&bytes[1..last]);
    let checksum_valid = received == computed;
    if !checksum_valid {
        if policy == ChecksumPolicy::Strict {
            return Err(ProtocolError::ChecksumMismatch { received, computed });
        }
        warn!(
            command = ?command,
            received,
            computed,
            "frame checksum mismatch; accepting frame"
        );
    }

    let frame = Frame {
        header: bytes[0],
        length,
        sequence: bytes[SEQUENCE_OFFSET],
        command,
        payload: bytes[3..payload_end].to_vec(),
        checksum: received,
        checksum_valid,
    };

    match command {
        CommandCode::Stat => match decode_status(&frame.payload) {
            Some(status) => Ok(DecodedMessage::Status { frame, status }),
            None => {
                debug!(seq = frame.sequence, "short STAT frame carries no status");
                Ok(DecodedMessage::Other { frame })
            }
        },
        CommandCode::Init => Ok(DecodedMessage::Init { frame }),
        _ => Ok(DecodedMessage::Other { frame }),
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// `None` when the payload stops short of the status offsets, as in a
/// status request or a sync frame.
fn decode_status(p: &[u8]) -> Option<StatusReport> {
    if p.len() < STAT_PAYLOAD_MIN {
        return None;
    }
    Some(StatusReport {
        result: StatusResult::from(p[STAT_RESULT]),
        state: KettleState::from(p[STAT_STATE]),
        keep_warm_seconds_remaining: read_u16(p, STAT_KEEP_WARM),
        current_temp_c: p[STAT_CURRENT_TEMP],
        target_temp_c: p[STAT_TARGET_TEMP],
        water_volume_ml: read_u16(p, STAT_VOLUME),
    })
}

/// Caller guarantees `offset + 1 < buf.len()`.
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

// ── Unit tests ────────────────────────────────────────────────────────────────
