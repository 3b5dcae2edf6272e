//! Fixed-layout binary codec for election notifications.
//!
//! A current-format notification is a packed big-endian record of 40 bytes:
//!
//! | offset | width | field                |
//! |-------:|------:|----------------------|
//! | 0      | 4     | sender state ordinal |
//! | 4      | 8     | proposed leader sid  |
//! | 12     | 8     | proposed zxid        |
//! | 20     | 8     | election epoch       |
//! | 28     | 8     | peer epoch           |
//! | 36     | 4     | format version       |
//!
//! Two legacy layouts are still accepted on decode: 28-byte records (no peer
//! epoch, no version; the peer epoch is synthesized from the zxid) and
//! 36-byte records (peer epoch present, no version).

use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

use crate::constants::CURRENT_NOTIFICATION_VERSION;
use crate::errors::CodecError;
use crate::message::Notification;
use crate::message::ToSend;
use crate::vote::ServerState;

const NOTIFICATION_LEN: usize = 40;
const LEGACY_NO_VERSION_LEN: usize = 36;
const LEGACY_NO_EPOCH_LEN: usize = 28;

/// Epoch a zxid was issued under: its upper 32 bits.
pub fn epoch_of_zxid(zxid: i64) -> i64 {
    zxid >> 32
}

/// Builds a zxid out of an epoch and a per-epoch counter.
pub fn make_zxid(
    epoch: i64,
    counter: i64,
) -> i64 {
    (epoch << 32) | (counter & 0xffff_ffff)
}

/// Packs an outbound notification into the current 40-byte layout.
pub fn build_notification_msg(m: &ToSend) -> Bytes {
    let mut buf = BytesMut::with_capacity(NOTIFICATION_LEN);
    buf.put_i32(m.state.to_wire());
    buf.put_i64(m.leader);
    buf.put_i64(m.zxid);
    buf.put_i64(m.election_epoch);
    buf.put_i64(m.peer_epoch);
    buf.put_i32(CURRENT_NOTIFICATION_VERSION);
    buf.freeze()
}

/// Decodes an inbound frame from `sid`.
///
/// Records shorter than 28 bytes and records with an unknown state ordinal
/// are rejected; the caller drops the message and keeps going.
pub fn parse_notification(
    sid: i64,
    payload: &[u8],
) -> Result<Notification, CodecError> {
    let len = payload.len();
    if len < LEGACY_NO_EPOCH_LEN {
        return Err(CodecError::ShortMessage { len });
    }

    let mut buf = payload;
    let ordinal = buf.get_i32();
    let state = ServerState::from_wire(ordinal).ok_or(CodecError::UnknownState { ordinal })?;

    let leader = buf.get_i64();
    let zxid = buf.get_i64();
    let election_epoch = buf.get_i64();

    // 28-byte senders predate the peer epoch field; derive it from the zxid.
    let peer_epoch = if len >= LEGACY_NO_VERSION_LEN {
        buf.get_i64()
    } else if len == LEGACY_NO_EPOCH_LEN {
        epoch_of_zxid(zxid)
    } else {
        return Err(CodecError::ShortMessage { len });
    };

    let version = if buf.remaining() >= 4 { buf.get_i32() } else { 0x0 };

    Ok(Notification {
        version,
        leader,
        zxid,
        election_epoch,
        peer_epoch,
        state,
        sid,
    })
}
