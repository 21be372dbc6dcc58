//! TCP session with the kettle: serialised writes, the read loop, and
//! self-healing reconnect.
//!
//! # Connection epochs (for beginners)
//!
//! The kettle drops its TCP connection often.  Rather than surface that to
//! callers, the session treats each socket as one *epoch*:
//!
//! ```text
//! connect ─► [epoch 1: read, decode, update state] ─► EOF / error
//!                                                        │
//!                 sleep(reconnect_backoff) ◄─────────────┘
//!                         │
//!                         ▼
//!            [epoch 2: new socket, same address] ─► …
//! ```
//!
//! Only the read loop ever ends an epoch.  Writers (commands, keep-alive)
//! never hold a socket of their own: every send locks `writer` and uses
//! whatever write half is there *now*, so nobody can write to a socket from
//! an earlier epoch.  Holding the lock for the whole `write_all` + `flush`
//! also guarantees that two envelopes are never interleaved on the wire.
//!
//! The sequence counter belongs to the session, not the socket, so it keeps
//! counting across epochs.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kettle_core::protocol::{
    build_command, ChecksumPolicy, DecodedMessage, EnvelopeAssembler, KettleCommand,
    SequenceCounter,
};
use kettle_core::DeviceIdentity;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::device_state::DeviceState;
use crate::application::transport::{KettleTransport, TransportError};
use crate::infrastructure::network::keep_alive::spawn_keep_alive;

const READ_CHUNK: usize = 4096;

/// Errors that can occur while opening a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The identity is neither discovered nor carries a usable address.
    #[error("kettle has not been discovered and no address is configured")]
    InvalidState,

    /// The first TCP connect failed.  Later failures are retried silently.
    #[error("failed to connect to kettle at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Settings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub device_addr: SocketAddr,
    pub reconnect_backoff: Duration,
    pub keep_alive_interval: Duration,
    pub checksum_policy: ChecksumPolicy,
}

/// A live, self-healing connection to one kettle.
pub struct Session {
    config: SessionConfig,
    imei: String,
    state: DeviceState,
    sequence: SequenceCounter,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Opens the TCP connection, sends an initial status query, and starts
    /// the read loop and keep-alive tasks.
    ///
    /// `state` must already hold `identity` as its link (the engine sets
    /// `Located` before connecting); it moves to `Connected` here.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] if the identity is not connectable,
    /// [`SessionError::ConnectFailed`] if the first connect fails.
    pub async fn connect(
        config: SessionConfig,
        identity: &DeviceIdentity,
        state: DeviceState,
    ) -> Result<Arc<Self>, SessionError> {
        if !identity.is_connectable() {
            return Err(SessionError::InvalidState);
        }
        if identity.imei.is_empty() {
            warn!("connecting without an IMEI; the kettle may ignore commands");
        }

        let addr = config.device_addr;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| SessionError::ConnectFailed { addr, source })?;
        let (reader, writer) = stream.into_split();

        let session = Arc::new(Self::with_writer(
            config,
            identity.imei.clone(),
            state,
            writer,
        ));
        session.state.mark_connected();
        info!("connected to kettle at {addr}");

        if let Err(e) = session.send_command(KettleCommand::Query).await {
            warn!("initial status query failed: {e}");
        }

        let read_loop = tokio::spawn(Arc::clone(&session).run(reader));
        let keep_alive = spawn_keep_alive(
            Arc::clone(&session) as Arc<dyn KettleTransport>,
            session.config.keep_alive_interval,
        );
        session.tasks().extend([read_loop, keep_alive]);

        Ok(session)
    }

    fn with_writer(
        config: SessionConfig,
        imei: String,
        state: DeviceState,
        writer: OwnedWriteHalf,
    ) -> Self {
        Self {
            config,
            imei,
            state,
            sequence: SequenceCounter::new(),
            writer: Mutex::new(Some(writer)),
            connected: AtomicBool::new(true),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Task handles; a poisoned lock still yields them so none are leaked.
    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn device_addr(&self) -> SocketAddr {
        self.config.device_addr
    }

    /// Hard teardown: stops both tasks and drops the socket.
    pub async fn shutdown(&self) {
        for task in self.tasks().drain(..) {
            task.abort();
        }
        self.writer.lock().await.take();
        self.connected.store(false, Ordering::Relaxed);
        self.state.mark_located();
        info!("session with {} shut down", self.config.device_addr);
    }

    // ── Read loop ─────────────────────────────────────────────────────────────

    /// Runs forever: one iteration per connection epoch.
    async fn run(self: Arc<Self>, mut reader: OwnedReadHalf) {
        let mut assembler = EnvelopeAssembler::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            self.read_epoch(&mut reader, &mut assembler, &mut buf).await;

            self.writer.lock().await.take();
            self.connected.store(false, Ordering::Relaxed);
            self.state.mark_reconnecting();
            assembler.clear();
            info!(
                "disconnected from kettle; reconnecting in {:?}",
                self.config.reconnect_backoff
            );

            reader = self.reconnect().await;
        }
    }

    async fn read_epoch(
        &self,
        reader: &mut OwnedReadHalf,
        assembler: &mut EnvelopeAssembler,
        buf: &mut [u8],
    ) {
        loop {
            match reader.read(buf).await {
                Ok(0) => {
                    info!("kettle closed the connection");
                    return;
                }
                Ok(n) => {
                    for message in assembler.push(&buf[..n], self.config.checksum_policy) {
                        self.handle(message);
                    }
                }
                Err(e) => {
                    warn!("read error on kettle session: {e}");
                    return;
                }
            }
        }
    }

    fn handle(&self, message: DecodedMessage) {
        match message {
            DecodedMessage::Status { frame, status } => {
                debug!(
                    "status seq={} state={:?} temp={}C water={}ml",
                    frame.sequence, status.state, status.current_temp_c, status.water_volume_ml
                );
                self.state.record_status(&status);
            }
            DecodedMessage::Init { frame } => {
                debug!("kettle handshake seq={}", frame.sequence);
            }
            DecodedMessage::Other { frame } => {
                debug!("kettle ack {:?} seq={}", frame.command, frame.sequence);
            }
        }
    }

    /// Retries forever with a fixed backoff.  Returns the new read half once
    /// the write half is installed.
    async fn reconnect(&self) -> OwnedReadHalf {
        let addr = self.config.device_addr;
        loop {
            tokio::time::sleep(self.config.reconnect_backoff).await;
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let (reader, writer) = stream.into_split();
                    *self.writer.lock().await = Some(writer);
                    self.connected.store(true, Ordering::Relaxed);
                    self.state.mark_connected();
                    info!("reconnected to kettle at {addr}");
                    return reader;
                }
                Err(e) => error!("reconnect to kettle at {addr} failed: {e}"),
            }
        }
    }

    // ── Write path ────────────────────────────────────────────────────────────

    /// Writes `bytes` through the currently installed write half.  Caller
    /// holds the writer lock.
    async fn write_locked(
        &self,
        slot: &mut Option<OwnedWriteHalf>,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let Some(writer) = slot.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        let result = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            // The read loop will see the dead socket and reconnect; until
            // then nothing else may write to it.
            slot.take();
            self.connected.store(false, Ordering::Relaxed);
            self.state.mark_reconnecting();
            return Err(TransportError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl KettleTransport for Session {
    async fn send_command(&self, command: KettleCommand) -> Result<(), TransportError> {
        let mut slot = self.writer.lock().await;
        if slot.is_none() {
            return Err(TransportError::NotConnected);
        }
        let seq = self.sequence.next();
        let bytes = build_command(command, seq, &self.imei)?;
        debug!("sending {:?} seq={seq}", command.code());
        self.write_locked(&mut slot, &bytes).await
    }

    async fn send_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut slot = self.writer.lock().await;
        self.write_locked(&mut slot, bytes).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
