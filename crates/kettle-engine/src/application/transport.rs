//! The seam between command logic and the live socket.

use async_trait::async_trait;
use kettle_core::protocol::{KettleCommand, ProtocolError};
use thiserror::Error;

/// Why a single send did not reach the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No socket is open in the current connection epoch.
    #[error("not connected to the kettle")]
    NotConnected,

    #[error("failed to encode command: {0}")]
    Encode(#[from] ProtocolError),

    /// The write failed; the read loop will notice and reconnect.
    #[error("write to kettle failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over whatever currently carries bytes to the kettle.
///
/// Implementations must serialise sends: one call's bytes are never
/// interleaved with another's on the wire.
#[async_trait]
pub trait KettleTransport: Send + Sync {
    /// Encodes `command` with the next sequence number and sends it.
    async fn send_command(&self, command: KettleCommand) -> Result<(), TransportError>;

    /// Sends pre-encoded bytes verbatim (used for the keep-alive literal).
    async fn send_raw(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Whether a socket is open right now.
    fn is_connected(&self) -> bool;
}
