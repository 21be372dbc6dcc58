//! The engine: one kettle, from discovery to shutdown.
//!
//! ```text
//! KettleEngine::discover()  ── UDP probe race, or configured address
//!          │
//! KettleEngine::connect()   ── Session: TCP, read loop, keep-alive
//!          │
//! query / wake / turn_on / turn_off  ── KettleController (state-gated)
//!          │
//! snapshot() / subscribe()  ── DeviceState (watch channel)
//! ```
//!
//! This is the surface a request layer (HTTP, MQTT, CLI…) builds on.  It
//! never retries commands and never waits for the kettle to react; callers
//! that need "wait until Ready" poll [`KettleEngine::snapshot`] or await
//! [`KettleEngine::subscribe`] with their own timeout.

use std::sync::{Arc, PoisonError};

use kettle_core::DeviceIdentity;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::application::control::KettleController;
use crate::application::device_state::{DeviceSnapshot, DeviceState, LinkState};
use crate::application::transport::KettleTransport;
use crate::infrastructure::network::discovery::{discover, DiscoveryError};
use crate::infrastructure::network::session::{Session, SessionError};
use crate::infrastructure::storage::config::EngineConfig;

/// Errors surfaced by [`KettleEngine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `connect` was called before any identity was known.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Orchestrates discovery, the session, and gated commands for one kettle.
pub struct KettleEngine {
    config: EngineConfig,
    state: DeviceState,
    session: std::sync::Mutex<Option<Arc<Session>>>,
    /// Held across `connect` so concurrent callers open one session.
    connecting: Mutex<()>,
}

impl KettleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: DeviceState::new(),
            session: std::sync::Mutex::new(None),
            connecting: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Locates the kettle.  Runs discovery at most once; later calls return
    /// the identity already found.
    ///
    /// # Errors
    ///
    /// [`EngineError::Discovery`] if the discovery listener cannot be bound.
    pub async fn discover(&self) -> Result<DeviceIdentity, EngineError> {
        if let Some(identity) = self.state.snapshot().identity() {
            return Ok(identity.clone());
        }
        let identity = discover(&self.config.discovery_request()).await?;
        self.state.set_link(LinkState::Located(identity.clone()));
        Ok(identity)
    }

    /// Opens the session.  Idempotent once connected.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidState`] if `discover` has not produced an
    ///   identity.
    /// - [`EngineError::Session`] if the identity has neither been discovered
    ///   nor carries an address, or the first TCP connect fails.
    pub async fn connect(&self) -> Result<(), EngineError> {
        let _connecting = self.connecting.lock().await;
        if self.current_session().is_some() {
            return Ok(());
        }
        let identity = self
            .state
            .snapshot()
            .identity()
            .cloned()
            .ok_or(EngineError::InvalidState("kettle has not been located"))?;

        let session = Session::connect(
            self.config.session_config(identity.address),
            &identity,
            self.state.clone(),
        )
        .await?;

        *self.slot() = Some(session);
        Ok(())
    }

    /// A consistent copy of the current device snapshot.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.snapshot()
    }

    /// Receiver for callers that want to await snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.state.subscribe()
    }

    /// `true` only for an identity found by broadcast, not one configured.
    pub fn is_discovered(&self) -> bool {
        self.state.snapshot().discovered()
    }

    pub async fn query(&self) -> bool {
        match self.controller() {
            Some(controller) => controller.query().await,
            None => reject("query"),
        }
    }

    pub async fn wake(&self) -> bool {
        match self.controller() {
            Some(controller) => controller.wake().await,
            None => reject("wake"),
        }
    }

    pub async fn turn_on(&self, target_temp_c: u8, keep_warm_mins: u8) -> bool {
        match self.controller() {
            Some(controller) => controller.turn_on(target_temp_c, keep_warm_mins).await,
            None => reject("turn on"),
        }
    }

    pub async fn turn_off(&self) -> bool {
        match self.controller() {
            Some(controller) => controller.turn_off().await,
            None => reject("turn off"),
        }
    }

    /// Stops the session's tasks and drops the socket.  The identity is
    /// kept, so `connect` may be called again.
    pub async fn shutdown(&self) {
        let _connecting = self.connecting.lock().await;
        let session = self.slot().take();
        if let Some(session) = session {
            session.shutdown().await;
        }
    }

    /// The slot is only ever replaced whole, so a poisoned lock is safe to
    /// recover.
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Session>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.slot().clone()
    }

    fn controller(&self) -> Option<KettleController> {
        self.current_session().map(|session| {
            KettleController::new(session as Arc<dyn KettleTransport>, self.state.clone())
        })
    }
}

fn reject(what: &str) -> bool {
    info!("{what} rejected: no session");
    false
}
