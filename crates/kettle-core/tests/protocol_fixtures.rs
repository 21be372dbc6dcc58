//! Integration tests for the kettle-core protocol codec.
//!
//! These run the public API against frames captured from real devices, and
//! check the properties that must hold for every command the controller
//! builds.

use kettle_core::protocol::codec::{checksum, decode_frame_hex, ProtocolError};
use kettle_core::protocol::envelope::{decode_envelopes, wrap_envelope, EnvelopeAssembler};
use kettle_core::protocol::messages::{
    ChecksumPolicy, CommandCode, DecodedMessage, KettleCommand, KettleState, StatusResult,
};
use kettle_core::protocol::SequenceCounter;
use kettle_core::{build_command, decode_frame};

// ── Captured frames ───────────────────────────────────────────────────────────

const K_ON_HEX: &str = "AA001200000000000003B70c390000006402000088";
const K_OFF_HEX: &str = "AA000D00000000000003B7283A0000d6";
const STAT_HEX: &str = "aa001803000000000000009b360000c800030000505004b30000f1";
const INIT_HEX: &str = "aa000d010000000000000071a40000dc00020000326402bc000020";
const SYNC_HEX: &str = "AA000D00000000000003B76d36000095";

/// Wraps a frame hex string the way the kettle does in its replies.
fn device_envelope(data3: &str) -> String {
    let json = format!(
        r#"{{"wifi_cmd":"62","imei":"GD0-12900-35aa","data3":"{data3}","suc":"00","seq":"155"}}"#
    );
    String::from_utf8(wrap_envelope(&json)).expect("envelope is ASCII")
}

/// Pulls the `data2` hex out of an outbound envelope.
fn request_frame(envelope: &[u8]) -> Vec<u8> {
    let text = std::str::from_utf8(envelope).expect("envelope is ASCII");
    let json = &text[6..text.len() - 2];
    let value: serde_json::Value = serde_json::from_str(json).expect("valid JSON");
    hex::decode(value["data2"].as_str().expect("data2 present")).expect("valid hex")
}

// ── Literal vectors ───────────────────────────────────────────────────────────

#[test]
fn test_k_on_fixture_decodes_with_valid_checksum() {
    let decoded = decode_frame_hex(K_ON_HEX, ChecksumPolicy::Strict).unwrap();
    assert_eq!(decoded.command(), CommandCode::KettleOn);
    assert!(decoded.frame().checksum_valid);
    assert_eq!(decoded.frame().sequence, 0x0C);
}

#[test]
fn test_k_off_fixture_decodes_with_valid_checksum() {
    let decoded = decode_frame_hex(K_OFF_HEX, ChecksumPolicy::Strict).unwrap();
    assert_eq!(decoded.command(), CommandCode::KettleOff);
    assert!(decoded.frame().checksum_valid);
}

#[test]
fn test_stat_fixture_decodes_status_fields() {
    // Act
    let decoded = decode_frame_hex(STAT_HEX, ChecksumPolicy::Permissive).unwrap();

    // Assert
    let DecodedMessage::Status { frame, status } = decoded else {
        panic!("expected a STAT message");
    };
    assert_eq!(frame.length as usize, frame.payload.len());
    assert!(frame.checksum_valid);
    assert_eq!(status.result, StatusResult::Ok);
    assert_eq!(status.state, KettleState::Ready);
    assert_eq!(status.keep_warm_seconds_remaining, 0);
    assert_eq!(status.current_temp_c, 80);
    assert_eq!(status.target_temp_c, 80);
    assert_eq!(status.water_volume_ml, 1203);
}

#[test]
fn test_init_fixture_is_accepted_despite_bad_checksum() {
    let decoded = decode_frame_hex(INIT_HEX, ChecksumPolicy::Permissive).unwrap();
    assert!(matches!(decoded, DecodedMessage::Init { .. }));
    assert!(!decoded.frame().checksum_valid);
}

#[test]
fn test_init_fixture_is_rejected_under_strict_policy() {
    let err = decode_frame_hex(INIT_HEX, ChecksumPolicy::Strict).unwrap_err();
    assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
}

// ── Properties of built commands ──────────────────────────────────────────────

#[test]
fn test_short_stat_sync_frame_decodes_without_status() {
    // Arrange / Act
    let decoded = decode_frame_hex(SYNC_HEX, ChecksumPolicy::Strict).unwrap();

    // Assert
    assert_eq!(decoded.command(), CommandCode::Stat);
    assert_eq!(decoded.frame().sequence, 0x6D);
    assert!(decoded.status().is_none());
}

#[test]
fn test_sync_frame_inside_envelope_is_not_dropped() {
    let messages = decode_envelopes(&device_envelope(SYNC_HEX), ChecksumPolicy::Permissive);
    assert_eq!(messages.len(), 1);
    assert!(matches!(messages[0], DecodedMessage::Other { .. }));
}

#[test]
fn test_built_commands_carry_valid_checksums_and_round_trip() {
    // Arrange
    let counter = SequenceCounter::starting_at(250);
    let commands = [
        KettleCommand::Query,
        KettleCommand::Wake,
        KettleCommand::Off,
        KettleCommand::On {
            target_temp_c: 85,
            keep_warm_mins: 20,
        },
    ];

    for command in commands.iter().cycle().take(12) {
        let seq = counter.next();

        // Act
        let envelope = build_command(*command, seq, "GD0-12900-35aa").unwrap();
        let frame = request_frame(&envelope);

        // Assert
        let last = frame.len() - 1;
        assert_eq!(checksum(&frame[1..last]), frame[last]);
        let decoded = decode_frame(&frame, ChecksumPolicy::Strict).unwrap();
        assert_eq!(decoded.command(), command.code());
        assert_eq!(decoded.frame().sequence, seq);
    }
}

#[test]
fn test_envelope_length_prefix_matches_json_bytes() {
    let envelope = build_command(KettleCommand::on_default(), 1, "ümlaut-imei").unwrap();
    let text = String::from_utf8(envelope).unwrap();
    let declared = usize::from_str_radix(&text[2..6], 16).unwrap();
    assert_eq!(declared, text.len() - 8);
    assert_eq!(&text[2..6], text[2..6].to_uppercase());
}

// ── Envelope splitting ────────────────────────────────────────────────────────

#[test]
fn test_two_envelopes_decode_to_exactly_two_messages() {
    // Arrange: each device envelope already ends in "&&".
    let buffer = format!("{}{}", device_envelope(STAT_HEX), device_envelope(K_OFF_HEX));

    // Act
    let messages = decode_envelopes(&buffer, ChecksumPolicy::Permissive);

    // Assert
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].command(), CommandCode::Stat);
    assert_eq!(messages[1].command(), CommandCode::KettleOff);
}

#[test]
fn test_trailing_empty_fragment_adds_no_message() {
    let buffer = format!("{}\r\n", device_envelope(STAT_HEX));
    assert_eq!(decode_envelopes(&buffer, ChecksumPolicy::Permissive).len(), 1);
}

#[test]
fn test_malformed_fragments_are_dropped_without_failing_the_buffer() {
    let buffer = format!(
        "short&&##0004nope&&##000e{{\"data3\":\"zz\"}}&&{}",
        device_envelope(INIT_HEX)
    );
    let messages = decode_envelopes(&buffer, ChecksumPolicy::Permissive);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].command(), CommandCode::Init);
}

#[test]
fn test_assembler_reassembles_envelope_split_across_reads() {
    // Arrange
    let stream = format!("{}{}", device_envelope(INIT_HEX), device_envelope(STAT_HEX));
    let bytes = stream.as_bytes();
    let mut assembler = EnvelopeAssembler::new();
    let mut decoded = Vec::new();

    // Act: feed in awkward 7-byte chunks.
    for chunk in bytes.chunks(7) {
        decoded.extend(assembler.push(chunk, ChecksumPolicy::Permissive));
    }

    // Assert
    let commands: Vec<_> = decoded.iter().map(DecodedMessage::command).collect();
    assert_eq!(commands, vec![CommandCode::Init, CommandCode::Stat]);
    assert!(assembler.pending().is_empty());
}
