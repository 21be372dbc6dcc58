//! The authoritative view of the kettle: link state plus last status.
//!
//! # Why a watch channel? (for beginners)
//!
//! Only the session's read loop writes status, but any number of callers
//! read it, often from other tasks.  `tokio::sync::watch` holds exactly one
//! current value: writers replace it atomically and readers either
//! [`borrow`](tokio::sync::watch::Receiver::borrow) a consistent copy or
//! `await` the next change.  No reader can observe half an update.
//!
//! # Link state machine
//!
//! ```text
//! Unstarted ──discover──► Located ──connect──► Connected
//!                                                │   ▲
//!                                   read failure ▼   │ reconnect
//!                                             Reconnecting
//! ```
//!
//! A "connected but never located" kettle cannot be expressed: every state
//! past `Unstarted` carries the [`DeviceIdentity`].

use std::sync::Arc;
use std::time::SystemTime;

use kettle_core::{DeviceIdentity, KettleState, StatusReport, StatusSnapshot};
use serde::Serialize;
use tokio::sync::watch;

/// Below this volume the kettle refuses to boil.
pub const MIN_WATER_ML: u16 = 100;

// ── Link state ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Unstarted,
    /// Identity known (broadcast reply or configuration); no session yet.
    Located(DeviceIdentity),
    Connected(DeviceIdentity),
    /// The last socket failed; the session is waiting to reopen it.
    Reconnecting(DeviceIdentity),
}

impl LinkState {
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        match self {
            LinkState::Unstarted => None,
            LinkState::Located(id) | LinkState::Connected(id) | LinkState::Reconnecting(id) => {
                Some(id)
            }
        }
    }
}

// ── Rejections ────────────────────────────────────────────────────────────────

/// Machine-readable reason a request layer should refuse a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionCategory {
    Disconnected,
    NeedsWater,
    NotOnBase,
    /// Connected, but no status report has arrived yet.
    Unresponsive,
    NotReady,
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// One consistent reading of the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSnapshot {
    pub link: LinkState,
    /// Last decoded STAT report; `None` until the first one arrives.
    pub status: Option<StatusSnapshot>,
}

impl DeviceSnapshot {
    pub fn connected(&self) -> bool {
        matches!(self.link, LinkState::Connected(_))
    }

    pub fn discovered(&self) -> bool {
        self.link.identity().is_some_and(|id| id.discovered)
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.link.identity()
    }

    pub fn imei(&self) -> Option<&str> {
        self.identity().map(|id| id.imei.as_str())
    }

    /// [`KettleState::Unknown`] until a STAT frame has been decoded.
    pub fn state(&self) -> KettleState {
        self.status.map(|s| s.state).unwrap_or_default()
    }

    pub fn current_temp_c(&self) -> Option<u8> {
        self.status.map(|s| s.current_temp_c)
    }

    pub fn water_volume_ml(&self) -> Option<u16> {
        self.status.map(|s| s.water_volume_ml)
    }

    pub fn status_observed_at(&self) -> Option<SystemTime> {
        self.status.map(|s| s.observed_at)
    }

    /// Reason to refuse any command, or `None` if the kettle can be talked to.
    pub fn rejection_for_command(&self) -> Option<RejectionCategory> {
        if !self.connected() {
            return Some(RejectionCategory::Disconnected);
        }
        match self.status {
            None => Some(RejectionCategory::Unresponsive),
            Some(s) if s.state == KettleState::NotOnBase => Some(RejectionCategory::NotOnBase),
            Some(_) => None,
        }
    }

    /// Reason to refuse a boil request.  Adds the water and readiness
    /// checks on top of [`rejection_for_command`](Self::rejection_for_command).
    pub fn rejection_for_turn_on(&self) -> Option<RejectionCategory> {
        if let Some(rejection) = self.rejection_for_command() {
            return Some(rejection);
        }
        if self.water_volume_ml().is_some_and(|ml| ml < MIN_WATER_ML) {
            return Some(RejectionCategory::NeedsWater);
        }
        if self.state() != KettleState::Ready {
            return Some(RejectionCategory::NotReady);
        }
        None
    }
}

// ── Shared state handle ───────────────────────────────────────────────────────

/// Cloneable handle to the published [`DeviceSnapshot`].
///
/// The session writes link changes and status; everyone else reads.
#[derive(Debug, Clone)]
pub struct DeviceState {
    tx: Arc<watch::Sender<DeviceSnapshot>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DeviceSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// A consistent copy of the current snapshot.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.tx.borrow().clone()
    }

    /// A receiver for callers that want to await changes.
    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.tx.subscribe()
    }

    pub fn set_link(&self, link: LinkState) {
        self.tx.send_modify(|snap| snap.link = link);
    }

    /// Replaces the status wholesale.
    pub fn record_status(&self, report: &StatusReport) {
        let status = StatusSnapshot::observed_now(report);
        self.tx.send_modify(|snap| snap.status = Some(status));
    }

    pub fn mark_connected(&self) {
        self.map_identity(LinkState::Connected);
    }

    pub fn mark_reconnecting(&self) {
        self.map_identity(LinkState::Reconnecting);
    }

    /// Drops back to `Located` (used on shutdown).
    pub fn mark_located(&self) {
        self.map_identity(LinkState::Located);
    }

    fn map_identity(&self, to: fn(DeviceIdentity) -> LinkState) {
        self.tx.send_if_modified(|snap| match snap.link.identity().cloned() {
            Some(id) => {
                snap.link = to(id);
                true
            }
            None => false,
        });
    }
}
