//! A fake kettle on a loopback TCP listener, shared by the integration tests.
//!
//! The fake speaks just enough of the protocol to be useful: it splits what
//! the controller sends on `&&`, pulls the inner frame out of each request
//! envelope, and can push STAT envelopes back.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use kettle_core::protocol::codec::checksum;
use kettle_core::protocol::envelope::wrap_envelope;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

pub const IMEI: &str = "GD0-TEST";
pub const KEEP_ALIVE_TEXT: &str = "##000bKeepConnect";
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Captured STAT frame: Ready, 80 °C, 1203 ml.
const STAT_HEX: &str = "aa001803000000000000009b360000c800030000505004b30000f1";

// ── Fake kettle ───────────────────────────────────────────────────────────────

pub struct FakeKettle {
    listener: TcpListener,
}

impl FakeKettle {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake kettle");
        Self { listener }
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("local addr")
    }

    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    pub async fn accept(&self) -> KettleConn {
        let (stream, _) = tokio::time::timeout(TIMEOUT, self.listener.accept())
            .await
            .expect("controller did not connect in time")
            .expect("accept");
        KettleConn {
            stream,
            buf: String::new(),
        }
    }

    /// Like [`accept`](Self::accept), but `None` if nobody connects within
    /// `within`.
    pub async fn try_accept(&self, within: Duration) -> Option<KettleConn> {
        let (stream, _) = tokio::time::timeout(within, self.listener.accept())
            .await
            .ok()?
            .expect("accept");
        Some(KettleConn {
            stream,
            buf: String::new(),
        })
    }
}

pub fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// Returns a loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

// ── One accepted connection ───────────────────────────────────────────────────

pub struct KettleConn {
    stream: TcpStream,
    buf: String,
}

impl KettleConn {
    /// Next `&&`-terminated message, without the delimiter.
    pub async fn next_message(&mut self) -> String {
        loop {
            if let Some(end) = self.buf.find("&&") {
                let message = self.buf[..end].to_string();
                self.buf.drain(..end + 2);
                return message;
            }
            let mut chunk = [0u8; 1024];
            let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut chunk))
                .await
                .expect("no data from controller in time")
                .expect("read");
            assert!(n > 0, "controller closed the connection");
            self.buf.push_str(std::str::from_utf8(&chunk[..n]).expect("ASCII"));
        }
    }

    /// Next command frame, skipping keep-alives.
    pub async fn next_command(&mut self) -> Vec<u8> {
        loop {
            let message = self.next_message().await;
            if message != KEEP_ALIVE_TEXT {
                return frame_of(&message);
            }
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
        self.stream.flush().await.expect("flush");
    }

    /// Aborts the connection with an RST instead of a clean close, so the
    /// controller's next read fails with an error rather than EOF.
    pub fn reset(self) {
        socket2::SockRef::from(&self.stream)
            .set_linger(Some(Duration::ZERO))
            .expect("set SO_LINGER");
    }

    /// `true` once the controller side has closed the socket.
    pub async fn closed_by_peer(&mut self) -> bool {
        let mut chunk = [0u8; 1024];
        loop {
            match tokio::time::timeout(TIMEOUT, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

// ── Protocol helpers ──────────────────────────────────────────────────────────

/// Parses a request envelope (without `&&`) and returns its inner frame.
pub fn frame_of(message: &str) -> Vec<u8> {
    let declared = usize::from_str_radix(&message[2..6], 16).expect("hex length");
    let json = &message[6..];
    assert_eq!(declared, json.len(), "length prefix must match JSON bytes");
    let value: serde_json::Value = serde_json::from_str(json).expect("valid JSON");
    assert_eq!(value["app_cmd"], "62");
    assert_eq!(value["imei"], IMEI);
    hex::decode(value["data2"].as_str().expect("data2")).expect("hex frame")
}

/// A kettle-side STAT envelope with the given state byte and water volume.
pub fn stat_envelope(state: u8, water_ml: u16) -> Vec<u8> {
    let mut frame = hex::decode(STAT_HEX).expect("fixture hex");
    frame[17] = state;
    frame[22..24].copy_from_slice(&water_ml.to_be_bytes());
    let last = frame.len() - 1;
    frame[last] = checksum(&frame[1..last]);
    let json = format!(
        r#"{{"wifi_cmd":"62","imei":"{IMEI}","data3":"{}","suc":"00","seq":"1"}}"#,
        hex::encode(&frame)
    );
    wrap_envelope(&json)
}

/// Waits until `pred` holds for the watched value.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut pred: F)
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let done = pred(&*rx.borrow_and_update());
            if done {
                return;
            }
            rx.changed().await.expect("sender dropped");
        }
    })
    .await
    .expect("condition not reached in time");
}
