//! Shared peer context consumed by the election loop and the messenger.
//!
//! [`QuorumPeer`] bundles the facts the enclosing server owns: the peer's
//! identity and learner type, its current state, its current (and
//! backward-compatible) vote, the voting view and the quorum verifier, and
//! a handle to the transaction log. Election code never mutates anything
//! else of the enclosing server.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

#[cfg(test)]
use mockall::automock;

use crate::quorum::QuorumServer;
use crate::quorum::QuorumVerifier;
use crate::vote::LearnerType;
use crate::vote::ServerState;
use crate::vote::Vote;

/// Read-only view of the transaction log / data tree.
///
/// The election algorithm consumes exactly two facts from it: the highest
/// logged zxid and the currently acknowledged epoch.
#[cfg_attr(test, automock)]
pub trait TxnLogView: Send + Sync + 'static {
    /// Highest zxid this peer has logged.
    fn last_logged_zxid(&self) -> i64;

    /// Epoch this peer last acknowledged. Reading it may touch stable
    /// storage and can fail; the failure aborts the election round.
    fn current_epoch(&self) -> io::Result<i64>;
}

/// The slice of the enclosing server's state that leader election reads and
/// writes. Shared between the election loop and the messenger workers.
pub struct QuorumPeer {
    id: i64,
    learner_type: LearnerType,
    state: AtomicI64,
    current_vote: RwLock<Option<Vote>>,
    bc_vote: RwLock<Option<Vote>>,
    voting_view: HashMap<i64, QuorumServer>,
    quorum_verifier: Arc<dyn QuorumVerifier>,
    txn_log: Arc<dyn TxnLogView>,

    // Unix millis of the first look_for_leader entry of the current outage;
    // 0 when no election is in flight.
    start_fle: AtomicI64,
}

impl QuorumPeer {
    pub fn new(
        id: i64,
        learner_type: LearnerType,
        voting_view: HashMap<i64, QuorumServer>,
        quorum_verifier: Arc<dyn QuorumVerifier>,
        txn_log: Arc<dyn TxnLogView>,
    ) -> Self {
        Self {
            id,
            learner_type,
            state: AtomicI64::new(ServerState::Looking.to_wire() as i64),
            current_vote: RwLock::new(None),
            bc_vote: RwLock::new(None),
            voting_view,
            quorum_verifier,
            txn_log,
            start_fle: AtomicI64::new(0),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn learner_type(&self) -> LearnerType {
        self.learner_type
    }

    pub fn state(&self) -> ServerState {
        let ordinal = self.state.load(Ordering::SeqCst) as i32;
        // Only to_wire() values are ever stored.
        ServerState::from_wire(ordinal).unwrap_or(ServerState::Looking)
    }

    pub fn set_state(
        &self,
        state: ServerState,
    ) {
        self.state.store(state.to_wire() as i64, Ordering::SeqCst);
    }

    pub fn current_vote(&self) -> Option<Vote> {
        *read_lock(&self.current_vote)
    }

    pub fn set_current_vote(
        &self,
        vote: Vote,
    ) {
        *write_lock(&self.current_vote) = Some(vote);
    }

    /// Vote as saved for peers speaking the pre-version wire format.
    pub fn bc_vote(&self) -> Option<Vote> {
        *read_lock(&self.bc_vote)
    }

    pub fn set_bc_vote(
        &self,
        vote: Vote,
    ) {
        *write_lock(&self.bc_vote) = Some(vote);
    }

    pub fn voting_view(&self) -> &HashMap<i64, QuorumServer> {
        &self.voting_view
    }

    pub fn is_voter(
        &self,
        sid: i64,
    ) -> bool {
        self.voting_view.contains_key(&sid)
    }

    pub fn quorum_verifier(&self) -> &Arc<dyn QuorumVerifier> {
        &self.quorum_verifier
    }

    pub fn last_logged_zxid(&self) -> i64 {
        self.txn_log.last_logged_zxid()
    }

    pub fn current_epoch(&self) -> io::Result<i64> {
        self.txn_log.current_epoch()
    }

    /// Stamps the start of the current election outage, first caller wins.
    /// Returns the stamp in effect.
    pub(crate) fn mark_fle_start(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        match self.start_fle.compare_exchange(0, now, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => now,
            Err(existing) => existing,
        }
    }

    pub(crate) fn clear_fle_start(&self) {
        self.start_fle.store(0, Ordering::SeqCst);
    }

    pub fn fle_start_millis(&self) -> i64 {
        self.start_fle.load(Ordering::SeqCst)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
