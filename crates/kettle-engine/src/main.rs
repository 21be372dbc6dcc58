//! Kettle Link headless host.
//!
//! Loads the configuration, locates the kettle, opens the session, and logs
//! every change to the device snapshot until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! kettle-link [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file [default: platform config dir]
//!   --broadcast <IP>             Discovery broadcast address
//!   --device-ip <IP>             Fixed kettle address (skips discovery)
//!   --imei <IMEI>                Kettle IMEI (use with --device-ip)
//!   --log-level <LEVEL>          Used when RUST_LOG is unset
//!   --discovery-timeout <SECS>   Give up discovery after this long
//! ```
//!
//! Every option can also be set through a `KETTLE_*` environment variable.
//! Command-line values override the config file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kettle_engine::infrastructure::storage::config::{
    config_file_path, load_config, parse_address, EngineConfig,
};
use kettle_engine::{DeviceSnapshot, KettleEngine};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Discover and hold a session with a network-attached kettle.
#[derive(Debug, Parser)]
#[command(name = "kettle-link", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "KETTLE_CONFIG")]
    config: Option<PathBuf>,

    /// Broadcast address for the discovery probe.
    #[arg(long, env = "KETTLE_BROADCAST")]
    broadcast: Option<String>,

    /// Fixed kettle IP address.  Skips discovery when set.
    #[arg(long, env = "KETTLE_DEVICE_IP")]
    device_ip: Option<String>,

    /// Kettle IMEI, required by the kettle when `--device-ip` is used.
    #[arg(long, env = "KETTLE_IMEI")]
    imei: Option<String>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "KETTLE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Stop waiting for a discovery reply after this many seconds.
    ///
    /// Discovery itself never times out; without this flag the host waits
    /// until the kettle answers.
    #[arg(long, env = "KETTLE_DISCOVERY_TIMEOUT")]
    discovery_timeout: Option<u64>,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if an
    /// address flag is not a valid IP address.
    fn into_engine_config(self) -> anyhow::Result<EngineConfig> {
        let path = match self.config {
            Some(path) => path,
            None => config_file_path().context("no --config given and no platform config dir")?,
        };
        let mut config = load_config(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        if let Some(broadcast) = self.broadcast {
            config.broadcast_address = parse_address(&broadcast)?;
        }
        if let Some(device_ip) = self.device_ip {
            config.device_address = Some(parse_address(&device_ip)?);
        }
        if let Some(imei) = self.imei {
            config.imei = Some(imei);
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let discovery_timeout = cli.discovery_timeout.map(Duration::from_secs);
    let config = cli.into_engine_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Kettle Link starting");
    let engine = KettleEngine::new(config);

    // ── Discovery ─────────────────────────────────────────────────────────────
    let identity = match discovery_timeout {
        Some(limit) => tokio::time::timeout(limit, engine.discover())
            .await
            .with_context(|| format!("no kettle answered within {limit:?}"))??,
        None => engine.discover().await?,
    };
    info!(
        "kettle {} at {} ({})",
        identity.imei,
        identity.address,
        if identity.discovered { "discovered" } else { "configured" }
    );

    // ── Session ───────────────────────────────────────────────────────────────
    engine.connect().await.context("failed to open kettle session")?;

    let mut updates = engine.subscribe();
    let watcher = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            log_snapshot(&snapshot);
        }
    });

    // ── Ctrl-C ────────────────────────────────────────────────────────────────
    info!("Kettle Link ready.  Press Ctrl-C to exit.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C signal: {e}");
    }

    info!("shutdown signal received");
    watcher.abort();
    engine.shutdown().await;
    info!("Kettle Link stopped");
    Ok(())
}

fn log_snapshot(snapshot: &DeviceSnapshot) {
    if !snapshot.connected() {
        warn!("kettle link: {:?}", snapshot.link);
        return;
    }
    match snapshot.status {
        Some(status) => info!(
            "kettle {:?}: {}C (target {}C), {}ml, keep-warm {}s left",
            status.state,
            status.current_temp_c,
            status.target_temp_c,
            status.water_volume_ml,
            status.keep_warm_seconds_remaining
        ),
        None => info!("kettle connected; waiting for first status"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
