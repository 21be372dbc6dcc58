//! Device identity and the status snapshot derived from STAT frames.

use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::protocol::messages::{KettleState, StatusReport};

/// Where the kettle lives and what it calls itself.
///
/// `discovered` is `true` only when the identity came from a broadcast
/// reply.  An identity built from configuration keeps `discovered = false`
/// even though it is perfectly usable; see [`is_connectable`](Self::is_connectable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub address: IpAddr,
    pub imei: String,
    pub discovered: bool,
}

impl DeviceIdentity {
    /// Identity learned from a discovery reply.
    pub fn discovered(address: IpAddr, imei: impl Into<String>) -> Self {
        Self {
            address,
            imei: imei.into(),
            discovered: true,
        }
    }

    /// Identity supplied by configuration.  The IMEI may be empty if the
    /// operator only knows the address.
    pub fn configured(address: IpAddr, imei: impl Into<String>) -> Self {
        Self {
            address,
            imei: imei.into(),
            discovered: false,
        }
    }

    /// Placeholder used before any identity is known.
    pub fn unspecified() -> Self {
        Self::configured(IpAddr::V4(Ipv4Addr::UNSPECIFIED), String::new())
    }

    /// A session may be opened when the device was discovered **or** a real
    /// address was configured.  Both halves are checked on purpose.
    pub fn is_connectable(&self) -> bool {
        self.discovered || !self.address.is_unspecified()
    }
}

/// The last decoded STAT report plus the time it was observed.
///
/// Replaced wholesale on every STAT frame; never merged field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: KettleState,
    pub current_temp_c: u8,
    pub target_temp_c: u8,
    pub water_volume_ml: u16,
    pub keep_warm_seconds_remaining: u16,
    pub observed_at: SystemTime,
}

impl StatusSnapshot {
    pub fn from_report(report: &StatusReport, observed_at: SystemTime) -> Self {
        Self {
            state: report.state,
            current_temp_c: report.current_temp_c,
            target_temp_c: report.target_temp_c,
            water_volume_ml: report.water_volume_ml,
            keep_warm_seconds_remaining: report.keep_warm_seconds_remaining,
            observed_at,
        }
    }

    /// Snapshot stamped with the current wall-clock time.
    pub fn observed_now(report: &StatusReport) -> Self {
        Self::from_report(report, SystemTime::now())
    }
}
