//! Fixed-period keep-alive sender.
//!
//! The kettle closes sessions that stay silent too long.  Every period this
//! task sends the raw `##000bKeepConnect&&` literal, resolving the socket
//! through the transport at send time.  A failed send is logged and the
//! task simply waits for the next tick; it never exits on its own.

use std::sync::Arc;
use std::time::Duration;

use kettle_core::protocol::KEEP_ALIVE;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::application::transport::KettleTransport;

/// Spawns the keep-alive task.  The first message goes out one full period
/// after spawning, not immediately.
pub fn spawn_keep_alive(transport: Arc<dyn KettleTransport>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !transport.is_connected() {
                debug!("keep-alive skipped: not connected");
                continue;
            }
            match transport.send_raw(KEEP_ALIVE).await {
                Ok(()) => debug!("keep-alive sent"),
                Err(e) => error!("keep-alive send failed: {e}"),
            }
        }
    })
}
