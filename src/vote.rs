//! Vote vocabulary types shared by the election loop and the messenger.

use std::fmt;

use crate::constants::CURRENT_NOTIFICATION_VERSION;

/// The four peer states distinguished by leader election.
///
/// The discriminants are the wire ordinals of the notification format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ServerState {
    Looking = 0,
    Following = 1,
    Leading = 2,
    Observing = 3,
}

impl ServerState {
    pub fn to_wire(self) -> i32 {
        self as i32
    }

    /// Maps a wire ordinal back to a state. Unknown ordinals yield `None`
    /// and the carrying message is dropped by the decoder.
    pub fn from_wire(ordinal: i32) -> Option<Self> {
        match ordinal {
            0 => Some(ServerState::Looking),
            1 => Some(ServerState::Following),
            2 => Some(ServerState::Leading),
            3 => Some(ServerState::Observing),
            _ => None,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            ServerState::Looking => "LOOKING",
            ServerState::Following => "FOLLOWING",
            ServerState::Leading => "LEADING",
            ServerState::Observing => "OBSERVING",
        };
        write!(f, "{s}")
    }
}

/// Whether a peer takes part in voting or merely learns the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerType {
    Participant,
    Observer,
}

/// A single peer's vote for a leader.
///
/// Equality compares `(id, zxid, election_epoch, peer_epoch)` only; `state`
/// and `version` are carried alongside but do not take part in termination
/// counting.
#[derive(Debug, Clone, Copy)]
pub struct Vote {
    /// Notification format version the vote was received with. Local votes
    /// carry [`CURRENT_NOTIFICATION_VERSION`].
    pub version: i32,

    /// Proposed leader sid.
    pub id: i64,

    /// Last zxid the proposed leader is known to have logged.
    pub zxid: i64,

    /// Election round the vote was cast in.
    pub election_epoch: i64,

    /// Epoch of the proposed leader.
    pub peer_epoch: i64,

    /// State of the peer that cast the vote.
    pub state: ServerState,
}

impl Vote {
    /// A proposal snapshot without a round tag, as handed to catch-up
    /// replies which stamp the round themselves.
    pub fn new(
        id: i64,
        zxid: i64,
        peer_epoch: i64,
    ) -> Self {
        Self::with_epochs(id, zxid, -1, peer_epoch)
    }

    pub fn with_epochs(
        id: i64,
        zxid: i64,
        election_epoch: i64,
        peer_epoch: i64,
    ) -> Self {
        Self {
            version: CURRENT_NOTIFICATION_VERSION,
            id,
            zxid,
            election_epoch,
            peer_epoch,
            state: ServerState::Looking,
        }
    }

    pub fn full(
        version: i32,
        id: i64,
        zxid: i64,
        election_epoch: i64,
        peer_epoch: i64,
        state: ServerState,
    ) -> Self {
        Self {
            version,
            id,
            zxid,
            election_epoch,
            peer_epoch,
            state,
        }
    }
}

impl PartialEq for Vote {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id
            && self.zxid == other.zxid
            && self.election_epoch == other.election_epoch
            && self.peer_epoch == other.peer_epoch
    }
}

impl Eq for Vote {}

impl fmt::Display for Vote {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "({}, {:#x}, {:#x})",
            self.id, self.zxid, self.peer_epoch
        )
    }
}
