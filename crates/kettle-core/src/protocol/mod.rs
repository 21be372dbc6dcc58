//! Protocol module containing message types, the frame codec, the JSON
//! envelope, and the encrypted-transport variant.

pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod messages;
pub mod sequence;

pub use codec::{build_command, decode_frame, ProtocolError};
pub use envelope::{decode_envelopes, EnvelopeAssembler};
pub use messages::*;
pub use sequence::SequenceCounter;
