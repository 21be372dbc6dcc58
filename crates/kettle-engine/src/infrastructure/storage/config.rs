//! TOML-based configuration for the kettle engine.
//!
//! Read from the platform-appropriate config file unless a path is given:
//! - Windows:  `%APPDATA%\KettleLink\config.toml`
//! - Linux:    `~/.config/kettle-link/config.toml`
//! - macOS:    `~/Library/Application Support/KettleLink/config.toml`
//!
//! Example:
//!
//! ```toml
//! broadcast_address = "192.168.1.255"
//! device_address = "192.168.1.40"
//! imei = "GD0-12900-35aa"
//! checksum_policy = "permissive"
//! ```
//!
//! Every field has a `#[serde(default = ...)]`, so a partial file (or no file
//! at all) still produces a working configuration.  The protocol ports and
//! timings default to what the kettle expects; tests shrink them.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use kettle_core::protocol::ChecksumPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::discovery::DiscoveryRequest;
use crate::infrastructure::network::session::SessionConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// An address given outside the TOML file (e.g. on the command line)
    /// was not a valid IP address.
    #[error("invalid IP address '{0}'")]
    InvalidAddress(String),
}

// ── Config schema ─────────────────────────────────────────────────────────────

/// Runtime settings for discovery, the session, and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Destination of the discovery probe.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: IpAddr,
    /// Fixed kettle address.  When set, discovery is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_address: Option<IpAddr>,
    /// Kettle IMEI.  Needed with `device_address`; learned from the
    /// discovery reply otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imei: Option<String>,
    /// TCP port of the kettle's session listener.
    #[serde(default = "default_device_port")]
    pub device_port: u16,
    /// UDP port used for both the probe and the reply.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Pause between losing the socket and reopening it.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
    /// Period between discovery probes.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default)]
    pub checksum_policy: ChecksumPolicy,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_broadcast_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::BROADCAST)
}
fn default_device_port() -> u16 {
    6002
}
fn default_discovery_port() -> u16 {
    15103
}
fn default_reconnect_backoff_ms() -> u64 {
    5_000
}
fn default_keep_alive_interval_ms() -> u64 {
    30_000
}
fn default_probe_interval_ms() -> u64 {
    1_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            broadcast_address: default_broadcast_address(),
            device_address: None,
            imei: None,
            device_port: default_device_port(),
            discovery_port: default_discovery_port(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            checksum_policy: ChecksumPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// The discovery inputs this configuration describes.
    pub fn discovery_request(&self) -> DiscoveryRequest {
        DiscoveryRequest {
            broadcast_address: self.broadcast_address,
            fixed_address: self.device_address,
            imei: self.imei.clone(),
            port: self.discovery_port,
            listen_port: self.discovery_port,
            probe_interval: self.probe_interval(),
        }
    }

    /// Session settings for a kettle at `device`.
    pub fn session_config(&self, device: IpAddr) -> SessionConfig {
        SessionConfig {
            device_addr: SocketAddr::new(device, self.device_port),
            reconnect_backoff: self.reconnect_backoff(),
            keep_alive_interval: self.keep_alive_interval(),
            checksum_policy: self.checksum_policy,
        }
    }
}

/// Parses an address given on the command line.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddress`] if `text` is not an IP address.
pub fn parse_address(text: &str) -> Result<IpAddr, ConfigError> {
    text.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(text.to_string()))
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `EngineConfig` from `path`, returning `EngineConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KettleLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("kettle-link"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KettleLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
