//! Integration tests for the kettle session against a fake kettle.
//!
//! # Purpose
//!
//! These tests run a real [`Session`] over loopback TCP and check the
//! properties callers rely on without ever seeing the socket:
//!
//! - An initial status query goes out as soon as the session opens.
//! - STAT envelopes (even split across reads) replace the snapshot.
//! - When the kettle closes or resets the connection the session reconnects
//!   by itself after the backoff, and the sequence number keeps counting.
//! - The keep-alive literal appears on the wire on schedule.
//! - Concurrent senders never interleave bytes inside an envelope.

mod common;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{localhost, stat_envelope, wait_for, FakeKettle, IMEI, KEEP_ALIVE_TEXT};
use kettle_core::protocol::{ChecksumPolicy, KettleCommand, KEEP_ALIVE};
use kettle_core::{DeviceIdentity, KettleState};
use kettle_engine::application::device_state::{DeviceState, LinkState};
use kettle_engine::application::transport::{KettleTransport, TransportError};
use kettle_engine::infrastructure::network::session::{Session, SessionConfig, SessionError};

const LONG: Duration = Duration::from_secs(60);

async fn open_session(
    kettle: &FakeKettle,
    reconnect_backoff: Duration,
    keep_alive_interval: Duration,
) -> (Arc<Session>, DeviceState) {
    let identity = DeviceIdentity::configured(localhost(), IMEI);
    let state = DeviceState::new();
    state.set_link(LinkState::Located(identity.clone()));
    let config = SessionConfig {
        device_addr: SocketAddr::new(localhost(), kettle.port()),
        reconnect_backoff,
        keep_alive_interval,
        checksum_policy: ChecksumPolicy::Permissive,
    };
    let session = Session::connect(config, &identity, state.clone())
        .await
        .expect("session must open");
    (session, state)
}

// ── Connect ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_sends_initial_query() {
    // Arrange
    let kettle = FakeKettle::start().await;
    let (session, state) = open_session(&kettle, LONG, LONG).await;
    let mut conn = kettle.accept().await;

    // Act
    let frame = conn.next_command().await;

    // Assert
    assert_eq!(frame[12], 0x36, "first command must be a status query");
    assert_eq!(frame[11], 0, "first sequence number is zero");
    assert!(state.snapshot().connected());
    assert!(session.is_connected());
    session.shutdown().await;
}

#[tokio::test]
async fn test_connect_rejects_unlocated_identity() {
    let kettle = FakeKettle::start().await;
    let config = SessionConfig {
        device_addr: kettle.addr(),
        reconnect_backoff: LONG,
        keep_alive_interval: LONG,
        checksum_policy: ChecksumPolicy::Permissive,
    };

    let result = Session::connect(config, &DeviceIdentity::unspecified(), DeviceState::new()).await;

    assert!(matches!(result, Err(SessionError::InvalidState)));
}

// ── Read loop ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_split_stat_envelope_updates_snapshot() {
    // Arrange
    let kettle = FakeKettle::start().await;
    let (session, state) = open_session(&kettle, LONG, LONG).await;
    let mut conn = kettle.accept().await;
    conn.next_command().await;
    let mut rx = state.subscribe();

    // Act: deliver one envelope in two writes.
    let envelope = stat_envelope(4, 1500);
    let (head, tail) = envelope.split_at(25);
    conn.send(head).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    conn.send(tail).await;

    // Assert
    wait_for(&mut rx, |snap| snap.state() == KettleState::Heating).await;
    let snap = state.snapshot();
    assert_eq!(snap.water_volume_ml(), Some(1500));
    assert_eq!(snap.current_temp_c(), Some(80));
    assert!(snap.status_observed_at().is_some());
    session.shutdown().await;
}

#[tokio::test]
async fn test_garbage_from_kettle_does_not_end_the_session() {
    let kettle = FakeKettle::start().await;
    let (session, state) = open_session(&kettle, LONG, LONG).await;
    let mut conn = kettle.accept().await;
    conn.next_command().await;
    let mut rx = state.subscribe();

    conn.send(b"junk&&##0010{\"data3\":\"zz\"}&&").await;
    conn.send(&stat_envelope(3, 900)).await;

    wait_for(&mut rx, |snap| snap.state() == KettleState::Ready).await;
    assert!(session.is_connected());
    session.shutdown().await;
}

// ── Reconnect ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnects_after_kettle_closes_connection() {
    // Arrange
    let kettle = FakeKettle::start().await;
    let (session, state) = open_session(&kettle, Duration::from_millis(300), LONG).await;
    let mut rx = state.subscribe();
    let mut first = kettle.accept().await;
    assert_eq!(first.next_command().await[11], 0);

    // Act: the kettle hangs up.
    drop(first);
    wait_for(&mut rx, |snap| matches!(snap.link, LinkState::Reconnecting(_))).await;
    let mut second = kettle.accept().await;
    wait_for(&mut rx, |snap| snap.connected()).await;

    // Assert: sends use the new socket and the sequence continues.
    session.send_command(KettleCommand::Query).await.unwrap();
    let frame = second.next_command().await;
    assert_eq!(frame[12], 0x36);
    assert_eq!(frame[11], 1);

    second.send(&stat_envelope(2, 700)).await;
    wait_for(&mut rx, |snap| snap.state() == KettleState::Standby).await;
    session.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_connection_reset() {
    // Arrange
    let kettle = FakeKettle::start().await;
    let (session, state) = open_session(&kettle, Duration::from_millis(300), LONG).await;
    let mut rx = state.subscribe();
    let mut first = kettle.accept().await;
    first.next_command().await;

    // Act: the kettle aborts the connection.
    first.reset();
    wait_for(&mut rx, |snap| matches!(snap.link, LinkState::Reconnecting(_))).await;
    let mut second = kettle.accept().await;
    wait_for(&mut rx, |snap| snap.connected()).await;

    // Assert: frames on the new connection are decoded.
    second.send(&stat_envelope(5, 800)).await;
    wait_for(&mut rx, |snap| snap.state() == KettleState::KeepWarm).await;
    assert_eq!(state.snapshot().water_volume_ml(), Some(800));
    session.shutdown().await;
}

#[tokio::test]
async fn test_send_between_epochs_fails_fast() {
    let kettle = FakeKettle::start().await;
    let (session, state) = open_session(&kettle, LONG, LONG).await;
    let mut rx = state.subscribe();
    let first = kettle.accept().await;

    drop(first);
    wait_for(&mut rx, |snap| matches!(snap.link, LinkState::Reconnecting(_))).await;

    let result = session.send_command(KettleCommand::Wake).await;
    assert!(matches!(result, Err(TransportError::NotConnected)));
    assert!(!session.is_connected());
    session.shutdown().await;
}

// ── Keep-alive ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_keep_alive_literal_reaches_the_kettle() {
    let kettle = FakeKettle::start().await;
    let (session, _state) = open_session(&kettle, LONG, Duration::from_millis(100)).await;
    let mut conn = kettle.accept().await;

    let _query = conn.next_message().await;
    let next = conn.next_message().await;

    assert_eq!(next, KEEP_ALIVE_TEXT);
    session.shutdown().await;
}

// ── Write serialisation ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_sends_never_interleave() {
    // Arrange
    let kettle = FakeKettle::start().await;
    let (session, _state) = open_session(&kettle, LONG, LONG).await;
    let mut conn = kettle.accept().await;
    let tasks = 16;
    let per_task = 5;

    // Act
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                for _ in 0..per_task {
                    session.send_command(KettleCommand::Query).await.unwrap();
                    session.send_raw(KEEP_ALIVE).await.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    // Assert: every message is whole, and every command seq is unique.
    let total = 1 + tasks * per_task * 2;
    let mut sequences = HashSet::new();
    let mut keep_alives = 0;
    for _ in 0..total {
        let message = conn.next_message().await;
        if message == KEEP_ALIVE_TEXT {
            keep_alives += 1;
        } else {
            let frame = common::frame_of(&message);
            assert!(sequences.insert(frame[11]), "duplicate sequence number");
        }
    }
    assert_eq!(keep_alives, tasks * per_task);
    assert_eq!(sequences.len(), 1 + tasks * per_task);
    session.shutdown().await;
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_closes_socket_and_keeps_identity() {
    let kettle = FakeKettle::start().await;
    let (session, state) = open_session(&kettle, LONG, LONG).await;
    let mut conn = kettle.accept().await;
    conn.next_command().await;

    session.shutdown().await;

    assert!(conn.closed_by_peer().await);
    assert!(!session.is_connected());
    assert!(matches!(state.snapshot().link, LinkState::Located(_)));
}
