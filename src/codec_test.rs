//! Unit tests for the notification wire codec.
//!
//! These tests verify:
//! - Round-trip of the current 40-byte layout
//! - The 28-byte and 36-byte legacy decode paths
//! - Rejection of short frames and unknown state ordinals
//! - The zxid/epoch helpers

use bytes::BufMut;
use bytes::BytesMut;

use crate::CodecError;
use crate::ServerState;
use crate::ToSend;
use crate::build_notification_msg;
use crate::constants::CURRENT_NOTIFICATION_VERSION;
use crate::epoch_of_zxid;
use crate::make_zxid;
use crate::parse_notification;

fn create_to_send(
    state: ServerState,
    leader: i64,
    zxid: i64,
    election_epoch: i64,
    peer_epoch: i64,
) -> ToSend {
    ToSend {
        leader,
        zxid,
        election_epoch,
        peer_epoch,
        state,
        sid: 0,
    }
}

#[test]
fn test_build_then_parse_round_trips() {
    let m = create_to_send(ServerState::Leading, 3, 0x5_0000_0001, 7, 5);
    let payload = build_notification_msg(&m);
    assert_eq!(payload.len(), 40);

    let n = parse_notification(9, &payload).unwrap();
    assert_eq!(n.sid, 9, "sid comes from the transport, not the frame");
    assert_eq!(n.leader, 3);
    assert_eq!(n.zxid, 0x5_0000_0001);
    assert_eq!(n.election_epoch, 7);
    assert_eq!(n.peer_epoch, 5);
    assert_eq!(n.state, ServerState::Leading);
    assert_eq!(n.version, CURRENT_NOTIFICATION_VERSION);
}

#[test]
fn test_round_trip_preserves_negative_fields() {
    // Observers vote i64::MIN for themselves; the codec must carry it.
    let m = create_to_send(ServerState::Looking, i64::MIN, i64::MIN, 1, i64::MIN);
    let n = parse_notification(5, &build_notification_msg(&m)).unwrap();
    assert_eq!(n.leader, i64::MIN);
    assert_eq!(n.zxid, i64::MIN);
    assert_eq!(n.peer_epoch, i64::MIN);
}

#[test]
fn test_legacy_28_byte_frame_synthesizes_peer_epoch() {
    let zxid = make_zxid(6, 0x42);
    let mut buf = BytesMut::with_capacity(28);
    buf.put_i32(ServerState::Looking.to_wire());
    buf.put_i64(2);
    buf.put_i64(zxid);
    buf.put_i64(4);

    let n = parse_notification(2, &buf.freeze()).unwrap();
    assert_eq!(n.leader, 2);
    assert_eq!(n.election_epoch, 4);
    assert_eq!(n.peer_epoch, 6, "peer epoch is the upper half of the zxid");
    assert_eq!(n.version, 0x0);
}

#[test]
fn test_legacy_36_byte_frame_has_no_version() {
    let m = create_to_send(ServerState::Following, 1, 0x10, 2, 3);
    let full = build_notification_msg(&m);

    let n = parse_notification(1, &full[..36]).unwrap();
    assert_eq!(n.peer_epoch, 3);
    assert_eq!(n.version, 0x0);
}

#[test]
fn test_short_frame_is_rejected() {
    let err = parse_notification(1, &[0u8; 27]).unwrap_err();
    assert!(matches!(err, CodecError::ShortMessage { len: 27 }));

    // Lengths between the legacy layouts are short too; never read past
    // the frame.
    let m = create_to_send(ServerState::Looking, 1, 0x10, 2, 3);
    let full = build_notification_msg(&m);
    let err = parse_notification(1, &full[..30]).unwrap_err();
    assert!(matches!(err, CodecError::ShortMessage { len: 30 }));
}

#[test]
fn test_unknown_state_ordinal_is_rejected() {
    let mut buf = BytesMut::with_capacity(40);
    buf.put_i32(9);
    buf.put_i64(1);
    buf.put_i64(1);
    buf.put_i64(1);
    buf.put_i64(1);
    buf.put_i32(CURRENT_NOTIFICATION_VERSION);

    let err = parse_notification(1, &buf.freeze()).unwrap_err();
    assert!(matches!(err, CodecError::UnknownState { ordinal: 9 }));
}

#[test]
fn test_zxid_helpers() {
    let zxid = make_zxid(5, 0x1234);
    assert_eq!(zxid, 0x5_0000_1234);
    assert_eq!(epoch_of_zxid(zxid), 5);
    assert_eq!(epoch_of_zxid(0), 0);
}
