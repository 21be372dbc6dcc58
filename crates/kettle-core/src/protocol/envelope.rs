//! Outer JSON envelope: `##` + 4 uppercase hex digits + JSON + `&&`.
//!
//! # Why a stream assembler? (for beginners)
//!
//! TCP is a byte stream, not a message stream.  The kettle may deliver two
//! envelopes in one `read()`, or split one envelope across two reads.
//! [`decode_envelopes`] handles the first case by splitting on the `&&`
//! delimiter.  [`EnvelopeAssembler`] handles the second by holding back any
//! text after the last delimiter until the next chunk arrives.

use tracing::{debug, warn};

use crate::protocol::codec::{decode_frame_hex, ProtocolError};
use crate::protocol::messages::{ChecksumPolicy, DecodedMessage, ResponsePayload};

/// Envelope terminator.
pub const DELIMITER: &str = "&&";

/// `##` plus four length digits.
const LENGTH_MARKER_LEN: usize = 6;

/// Fragments shorter than this cannot hold a marker and a JSON object.
const MIN_FRAGMENT_LEN: usize = 12;

/// Upper bound on undelimited text held by [`EnvelopeAssembler`].
pub const MAX_PENDING: usize = 64 * 1024;

/// Wraps a JSON string into envelope bytes.
///
/// The length field is the UTF-8 byte length of `json`, uppercase and
/// zero-padded to four digits.
pub fn wrap_envelope(json: &str) -> Vec<u8> {
    format!("##{:04X}{json}{DELIMITER}", json.len()).into_bytes()
}

/// Decodes every complete envelope in `buffer`.
///
/// Malformed fragments are logged and skipped; they never abort the rest of
/// the buffer.  The result may be empty.
pub fn decode_envelopes(buffer: &str, policy: ChecksumPolicy) -> Vec<DecodedMessage> {
    buffer
        .split(DELIMITER)
        .filter_map(|fragment| match decode_fragment(fragment, policy) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping envelope fragment: {e}");
                None
            }
        })
        .collect()
}

/// Decodes a single `&&`-free fragment.
///
/// Returns `Ok(None)` for fragments that are silently skipped: blank text,
/// and non-JSON bodies such as an echoed keep-alive.
///
/// # Errors
///
/// [`ProtocolError::MalformedPayload`] for fragments too short to be an
/// envelope, [`ProtocolError::InvalidJson`] when the body does not parse, and
/// any frame-level error from the codec.
pub fn decode_fragment(
    fragment: &str,
    policy: ChecksumPolicy,
) -> Result<Option<DecodedMessage>, ProtocolError> {
    if fragment.trim().is_empty() {
        return Ok(None);
    }
    if fragment.len() < MIN_FRAGMENT_LEN {
        return Err(ProtocolError::MalformedPayload(format!(
            "fragment too short ({} chars): {fragment:?}",
            fragment.len()
        )));
    }

    let body = match fragment.get(LENGTH_MARKER_LEN..) {
        Some(body) if body.starts_with('{') => body,
        _ => {
            debug!(fragment, "skipping non-JSON envelope");
            return Ok(None);
        }
    };

    let response: ResponsePayload =
        serde_json::from_str(body).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    decode_frame_hex(&response.data3, policy).map(Some)
}

// ── Stream assembler ──────────────────────────────────────────────────────────

/// Accumulates socket reads and yields messages once their `&&` arrives.
#[derive(Debug, Default)]
pub struct EnvelopeAssembler {
    pending: String,
}

impl EnvelopeAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one read's worth of bytes and decodes every envelope that is
    /// now complete.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the affected fragment
    /// then fails JSON or hex parsing and is dropped like any other malformed
    /// fragment.
    pub fn push(&mut self, chunk: &[u8], policy: ChecksumPolicy) -> Vec<DecodedMessage> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let Some(end) = self.pending.rfind(DELIMITER) else {
            self.enforce_cap();
            return Vec::new();
        };

        let rest = self.pending.split_off(end + DELIMITER.len());
        let complete = std::mem::replace(&mut self.pending, rest);
        self.enforce_cap();
        decode_envelopes(&complete, policy)
    }

    /// Text received after the last delimiter.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Discards buffered text; called when a connection epoch ends.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn enforce_cap(&mut self) {
        if self.pending.len() > MAX_PENDING {
            warn!(
                bytes = self.pending.len(),
                "discarding undelimited receive buffer"
            );
            self.pending.clear();
        }
    }
}
