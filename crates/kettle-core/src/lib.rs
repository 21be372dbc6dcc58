//! # kettle-core
//!
//! Shared library for Kettle Link containing the wire protocol codec, the
//! device data model, and the encrypted-transport variant.
//!
//! This crate has zero dependencies on sockets, async runtimes, or OS APIs.
//! Everything here is a pure function over bytes and strings, which is what
//! makes the protocol fixtures testable without a kettle on the desk.
//!
//! # Architecture overview (for beginners)
//!
//! The kettle speaks a two-layer protocol over TCP:
//!
//! ```text
//! ##0049{"app_cmd":"62","imei":"…","SubDev":"","data2":"aa000d…fd"}&&
//! └┬┘└┬─┘└────────────────── JSON ───────────────────────────────┘└┬┘
//!  │  └ JSON byte length, 4 uppercase hex digits                    └ delimiter
//!  └ envelope marker
//! ```
//!
//! - **`protocol`** – The outer *envelope* (length-prefixed JSON terminated by
//!   `&&`) and the inner *frame* (a compact byte-offset binary message carried
//!   hex-encoded inside the JSON).  Encoding turns a [`KettleCommand`] into
//!   envelope bytes; decoding turns a receive buffer into zero or more
//!   [`DecodedMessage`]s.
//!
//! - **`domain`** – The device identity and the status snapshot derived from
//!   decoded STAT frames.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `kettle_core::KettleCommand` instead of `kettle_core::protocol::messages::KettleCommand`.
pub use domain::device::{DeviceIdentity, StatusSnapshot};
pub use protocol::codec::{build_command, decode_frame, ProtocolError};
pub use protocol::envelope::{decode_envelopes, EnvelopeAssembler};
pub use protocol::messages::{
    ChecksumPolicy, CommandCode, DecodedMessage, KettleCommand, KettleState, StatusReport,
};
