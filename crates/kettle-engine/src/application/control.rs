//! Gated command use case.
//!
//! Each high-level command is checked against the *cached* snapshot before
//! anything is sent.  A failed precondition returns `false` without touching
//! the transport.  A successful send is followed by a status query so the
//! read loop picks up the device's reaction promptly.
//!
//! The returned `bool` reports whether the attempt was made, not whether the
//! kettle obeyed: that is only confirmed by a later STAT frame.

use std::sync::Arc;

use kettle_core::{KettleCommand, KettleState};
use tracing::{debug, info, warn};

use crate::application::device_state::DeviceState;
use crate::application::transport::KettleTransport;

/// Sends commands to the kettle on behalf of callers.
pub struct KettleController {
    transport: Arc<dyn KettleTransport>,
    state: DeviceState,
}

impl KettleController {
    pub fn new(transport: Arc<dyn KettleTransport>, state: DeviceState) -> Self {
        Self { transport, state }
    }

    /// Requests a status report.  Permitted whenever connected.
    pub async fn query(&self) -> bool {
        if !self.ready_to_send("query") {
            return false;
        }
        self.send(KettleCommand::Query).await
    }

    /// Wakes the kettle from standby.  No-op if it is already `Ready`.
    pub async fn wake(&self) -> bool {
        if !self.ready_to_send("wake") {
            return false;
        }
        let state = self.state.snapshot().state();
        if state == KettleState::Ready {
            debug!("wake skipped: kettle already ready");
            return false;
        }
        self.send_then_query(KettleCommand::Wake).await
    }

    /// Starts boiling.  Only permitted from `Ready`.
    pub async fn turn_on(&self, target_temp_c: u8, keep_warm_mins: u8) -> bool {
        if !self.ready_to_send("turn on") {
            return false;
        }
        let state = self.state.snapshot().state();
        if state != KettleState::Ready {
            info!("turn on rejected: kettle is {state:?}, not Ready");
            return false;
        }
        self.send_then_query(KettleCommand::On {
            target_temp_c,
            keep_warm_mins,
        })
        .await
    }

    /// Stops heating.  Only permitted while `Heating` or `KeepWarm`.
    pub async fn turn_off(&self) -> bool {
        if !self.ready_to_send("turn off") {
            return false;
        }
        let state = self.state.snapshot().state();
        if !matches!(state, KettleState::Heating | KettleState::KeepWarm) {
            info!("turn off rejected: kettle is {state:?}");
            return false;
        }
        self.send_then_query(KettleCommand::Off).await
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn ready_to_send(&self, what: &str) -> bool {
        let connected = self.state.snapshot().connected() && self.transport.is_connected();
        if !connected {
            info!("{what} rejected: not connected");
        }
        connected
    }

    async fn send(&self, command: KettleCommand) -> bool {
        match self.transport.send_command(command).await {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to send {:?}: {e}", command.code());
                false
            }
        }
    }

    async fn send_then_query(&self, command: KettleCommand) -> bool {
        if !self.send(command).await {
            return false;
        }
        if let Err(e) = self.transport.send_command(KettleCommand::Query).await {
            warn!("follow-up status query failed: {e}");
        }
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
