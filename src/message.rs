//! Messages exchanged between the election loop, the messenger and the
//! connection manager.

use std::fmt;

use bytes::Bytes;

use crate::vote::ServerState;
use crate::vote::Vote;

/// A raw frame handed over by the connection manager, tagged with the sid
/// of the peer it arrived from.
#[derive(Debug, Clone)]
pub struct PeerMessage {
    pub sid: i64,
    pub payload: Bytes,
}

/// An inbound decoded election message.
///
/// Notifications let other peers know that a given peer has changed its
/// vote, either because it joined leader election or because it learned of
/// another peer with higher precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Format version the sender used.
    pub version: i32,

    /// Proposed leader sid.
    pub leader: i64,

    /// zxid of the proposed leader.
    pub zxid: i64,

    /// Election round of the sender.
    pub election_epoch: i64,

    /// Epoch of the proposed leader.
    pub peer_epoch: i64,

    /// Current state of the sender.
    pub state: ServerState,

    /// Sender sid.
    pub sid: i64,
}

impl Notification {
    /// The vote this notification carries, as counted by the termination
    /// predicate.
    pub fn vote(&self) -> Vote {
        Vote::full(
            self.version,
            self.leader,
            self.zxid,
            self.election_epoch,
            self.peer_epoch,
            self.state,
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{:#x} (message format version), {} (n.leader), {:#x} (n.zxid), {:#x} (n.round), \
             {} (n.state), {} (n.sid), {:#x} (n.peerEpoch)",
            self.version, self.leader, self.zxid, self.election_epoch, self.state, self.sid,
            self.peer_epoch
        )
    }
}

/// An outbound election message addressed to a specific peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToSend {
    /// Proposed leader sid.
    pub leader: i64,

    /// zxid of the proposed leader.
    pub zxid: i64,

    /// Election round of the local peer.
    pub election_epoch: i64,

    /// Epoch of the proposed leader.
    pub peer_epoch: i64,

    /// Current state of the local peer.
    pub state: ServerState,

    /// Destination sid.
    pub sid: i64,
}
