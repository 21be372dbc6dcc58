//! UDP broadcast discovery of the kettle.
//!
//! # How discovery works (for beginners)
//!
//! The kettle does not announce itself.  Instead the controller shouts a
//! fixed probe string at the LAN broadcast address once per period, and the
//! kettle answers with a `#`-separated datagram:
//!
//! ```text
//! controller ──"Probe#2020-05-05-10-47-15-2"──► 255.255.255.255:15103
//! kettle     ──"GD0-12900-35aa#123456#…#…#…"──► controller:15103
//!              └── IMEI ──────┘ └ marker ┘
//! ```
//!
//! The reply's source address is the kettle's IP.  The probe is sent from
//! the listening socket itself, so a kettle that answers the sender's port
//! and one that answers port 15103 are both heard.
//!
//! Probing and listening race inside one `tokio::select!`; the first valid
//! reply wins.  There is deliberately no overall timeout here: wrap the call
//! in `tokio::time::timeout` if the caller wants one.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use kettle_core::DeviceIdentity;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Literal probe datagram.
pub const PROBE: &[u8] = b"Probe#2020-05-05-10-47-15-2";

/// Field 1 of every genuine reply.
pub const REPLY_MARKER: &str = "123456";

const MIN_REPLY_FIELDS: usize = 5;

/// Error type for discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP listener could not be set up.  Fatal for this discovery run.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Inputs to a discovery run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRequest {
    pub broadcast_address: IpAddr,
    /// Skip the network entirely and use this address.
    pub fixed_address: Option<IpAddr>,
    /// IMEI to pair with `fixed_address`.
    pub imei: Option<String>,
    /// Port the probe is sent to.
    pub port: u16,
    /// Local port the listener binds; normally the same as `port`.
    pub listen_port: u16,
    pub probe_interval: Duration,
}

/// Finds the kettle.
///
/// With a fixed address this returns immediately with
/// `discovered = false`.  Otherwise it probes until a valid reply arrives.
///
/// # Errors
///
/// [`DiscoveryError::BindFailed`] if the listener cannot be bound.  Once
/// bound, send and receive failures are logged and discovery keeps going.
pub async fn discover(request: &DiscoveryRequest) -> Result<DeviceIdentity, DiscoveryError> {
    if let Some(address) = request.fixed_address {
        let imei = request.imei.clone().unwrap_or_default();
        info!("using configured kettle at {address} (imei '{imei}'); skipping discovery");
        return Ok(DeviceIdentity::configured(address, imei));
    }

    let socket = bind_listener(request.listen_port)?;
    let target = SocketAddr::new(request.broadcast_address, request.port);
    info!("probing for kettle via {target}");

    let mut ticker = tokio::time::interval(request.probe_interval);
    let mut buf = [0u8; 1024];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("sending discovery probe to {target}");
                if let Err(e) = socket.send_to(PROBE, target).await {
                    warn!("failed to send discovery probe: {e}");
                }
            }
            received = socket.recv_from(&mut buf) => {
                let failed = received.is_err();
                if let Some(identity) = identity_from(received, &buf) {
                    return Ok(identity);
                }
                if failed {
                    tokio::time::sleep(request.probe_interval).await;
                }
            }
        }
    }
}

/// Turns one `recv_from` outcome into an identity.  Receive errors are
/// logged and never end discovery.
fn identity_from(
    received: std::io::Result<(usize, SocketAddr)>,
    buf: &[u8],
) -> Option<DeviceIdentity> {
    match received {
        Ok((len, src)) => match parse_reply(&buf[..len]) {
            Some(imei) => {
                info!("discovered kettle {imei} at {}", src.ip());
                Some(DeviceIdentity::discovered(src.ip(), imei))
            }
            None => {
                debug!("ignoring {len}-byte datagram from {src}");
                None
            }
        },
        // Windows reports ICMP port-unreachable on UDP sockets this way.
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
            debug!("discovery recv reset: {e}");
            None
        }
        Err(e) => {
            warn!("discovery recv failed, still listening: {e}");
            None
        }
    }
}

/// Extracts the IMEI (field 0, taken as-is) from a reply datagram, or `None`
/// if the datagram is a probe or does not have the reply shape.
pub fn parse_reply(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);
    if text.starts_with("Probe") {
        return None;
    }
    let fields: Vec<&str> = text.split('#').collect();
    if fields.len() < MIN_REPLY_FIELDS || fields[1] != REPLY_MARKER {
        return None;
    }
    Some(fields[0].to_string())
}

/// Binds a broadcast-capable, address-reusable UDP socket on every IPv4
/// interface.
fn bind_listener(port: u16) -> Result<UdpSocket, DiscoveryError> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let bind_failed = |source| DiscoveryError::BindFailed { addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_failed)?;
    socket.set_reuse_address(true).map_err(bind_failed)?;
    socket.set_broadcast(true).map_err(bind_failed)?;
    socket.set_nonblocking(true).map_err(bind_failed)?;
    socket.bind(&SockAddr::from(addr)).map_err(bind_failed)?;

    UdpSocket::from_std(socket.into()).map_err(bind_failed)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
