//! Push-based leader election over the abstract connection manager.
//!
//! Each peer broadcasts its vote, collects the votes of the other members
//! of the voting view, and decides once a quorum agrees on a single
//! candidate that precedes every other vote seen in the current round.
//! Peers joining an ensemble that already has a leader converge through
//! the out-of-election tally instead of forcing a fresh round.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use tokio::time::Instant;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::messenger::Messenger;
use super::queue::TrackedReceiver;
use super::queue::TrackedSender;
use super::queue::tracked_channel;
use crate::Result;
use crate::config::ElectionConfig;
use crate::constants::OBSERVER_ID;
use crate::errors::ElectionError;
use crate::message::Notification;
use crate::message::ToSend;
use crate::metrics::ELECTION_DECISION_LATENCY_METRIC;
use crate::metrics::ELECTION_START_AT_METRIC;
use crate::peer::QuorumPeer;
use crate::transport::ConnectionManager;
use crate::vote::LearnerType;
use crate::vote::ServerState;
use crate::vote::Vote;

/// The proposal triple of the current round.
#[derive(Debug, Clone, Copy)]
struct Proposal {
    leader: i64,
    zxid: i64,
    peer_epoch: i64,
}

/// Election state shared between the election loop and the receiver worker.
///
/// The proposal triple is only mutated under its lock by the election loop;
/// the receiver worker takes snapshots of it when synthesizing catch-up
/// replies. The logical clock is written by the loop and read lock-free by
/// the worker; a slightly stale read costs one redundant notification at
/// most, never a wrong decision.
pub(crate) struct ProposalState {
    logical_clock: AtomicI64,
    proposal: Mutex<Proposal>,
}

impl ProposalState {
    pub(crate) fn new() -> Self {
        Self {
            logical_clock: AtomicI64::new(0),
            proposal: Mutex::new(Proposal {
                leader: -1,
                zxid: -1,
                peer_epoch: -1,
            }),
        }
    }

    pub(crate) fn logical_clock(&self) -> i64 {
        self.logical_clock.load(Ordering::SeqCst)
    }

    pub(crate) fn set_logical_clock(
        &self,
        value: i64,
    ) {
        self.logical_clock.store(value, Ordering::SeqCst);
    }

    /// One clock bump per election round; the self-vote lands under the
    /// same critical section.
    pub(crate) fn bump_clock_and_propose(
        &self,
        leader: i64,
        zxid: i64,
        peer_epoch: i64,
    ) {
        let mut p = lock(&self.proposal);
        self.logical_clock.fetch_add(1, Ordering::SeqCst);
        *p = Proposal {
            leader,
            zxid,
            peer_epoch,
        };
    }

    pub(crate) fn update_proposal(
        &self,
        leader: i64,
        zxid: i64,
        peer_epoch: i64,
    ) {
        let mut p = lock(&self.proposal);
        debug!(
            "Updating proposal: {} (newleader), {:#x} (newzxid), {} (oldleader), {:#x} (oldzxid)",
            leader, zxid, p.leader, p.zxid
        );
        *p = Proposal {
            leader,
            zxid,
            peer_epoch,
        };
    }

    /// Snapshot of the proposal triple as a round-less vote.
    pub(crate) fn proposal_vote(&self) -> Vote {
        let p = lock(&self.proposal);
        Vote::new(p.leader, p.zxid, p.peer_epoch)
    }
}

fn lock(m: &Mutex<Proposal>) -> std::sync::MutexGuard<'_, Proposal> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One leader election instance of a peer.
///
/// Created once per process together with its connection manager; the
/// enclosing server calls [`look_for_leader`](Self::look_for_leader) every
/// time it falls back to `LOOKING`, stores the returned vote via
/// [`QuorumPeer::set_current_vote`] and transitions to the role the peer
/// state now names. Must be created within a Tokio runtime: construction
/// spawns the messenger workers.
pub struct FastLeaderElection {
    peer: Arc<QuorumPeer>,
    manager: Arc<dyn ConnectionManager>,
    config: ElectionConfig,
    shared: Arc<ProposalState>,
    send_tx: TrackedSender<ToSend>,
    recv_tx: TrackedSender<Notification>,
    recv_rx: tokio::sync::Mutex<TrackedReceiver<Notification>>,
    messenger: Messenger,
    stop: AtomicBool,
}

impl FastLeaderElection {
    pub fn new(
        peer: Arc<QuorumPeer>,
        manager: Arc<dyn ConnectionManager>,
        config: ElectionConfig,
    ) -> Self {
        let shared = Arc::new(ProposalState::new());
        let (send_tx, send_rx) = tracked_channel();
        let (recv_tx, recv_rx) = tracked_channel();

        let messenger = Messenger::start(
            peer.clone(),
            manager.clone(),
            shared.clone(),
            send_rx,
            send_tx.clone(),
            recv_tx.clone(),
            config.worker_poll_interval(),
        );

        Self {
            peer,
            manager,
            config,
            shared,
            send_tx,
            recv_tx,
            recv_rx: tokio::sync::Mutex::new(recv_rx),
            messenger,
            stop: AtomicBool::new(false),
        }
    }

    /// Current value of the logical clock counter.
    pub fn logical_clock(&self) -> i64 {
        self.shared.logical_clock()
    }

    /// True iff both the send and the receive queue are empty.
    pub fn queue_empty(&self) -> bool {
        self.send_tx.is_empty() && self.recv_tx.is_empty()
    }

    /// Halts the connection manager and both messenger workers. A running
    /// `look_for_leader` observes the stop flag at its next iteration.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        debug!("Shutting down connection manager");
        self.manager.halt();
        debug!("Shutting down messenger");
        self.messenger.halt();
        debug!("FLE is down");
    }

    /// Starts a new round of leader election. Whenever the enclosing
    /// server changes its state to `LOOKING` this method is invoked; it
    /// sends notifications to all other peers and converges on a decided
    /// vote, or returns `None` once halted.
    ///
    /// The only abnormal exit is a failed current-epoch read from the
    /// transaction log.
    pub async fn look_for_leader(&self) -> Result<Option<Vote>> {
        let start_at = self.peer.mark_fle_start();
        let sid_label = self.peer.id().to_string();
        ELECTION_START_AT_METRIC
            .with_label_values(&[&sid_label])
            .set(start_at as f64);
        let entered = Instant::now();

        let result = self.run_round().await;

        ELECTION_START_AT_METRIC.with_label_values(&[&sid_label]).set(0.0);
        if let Ok(Some(_)) = &result {
            ELECTION_DECISION_LATENCY_METRIC
                .with_label_values(&[&sid_label])
                .observe(entered.elapsed().as_millis() as f64);
            self.peer.clear_fle_start();
        }

        result
    }

    async fn run_round(&self) -> Result<Option<Vote>> {
        let mut recvset: HashMap<i64, Vote> = HashMap::new();

        // Votes from peers already FOLLOWING or LEADING; consulted when
        // joining an established ensemble.
        let mut outofelection: HashMap<i64, Vote> = HashMap::new();

        let mut not_timeout = self.config.finalize_wait();

        let (init_id, init_zxid, init_epoch) = self.initial_vote()?;
        self.shared.bump_clock_and_propose(init_id, init_zxid, init_epoch);

        info!(
            "New election. My id = {}, proposed zxid={:#x}",
            self.peer.id(),
            init_zxid
        );
        self.send_notifications();

        let mut rx = self.recv_rx.lock().await;

        // Exchange notifications until we find a leader.
        while self.peer.state() == ServerState::Looking && !self.stop.load(Ordering::SeqCst) {
            let n = match timeout(not_timeout, rx.recv()).await {
                Ok(Some(n)) => Some(n),
                // The messenger is gone; same as a halt.
                Ok(None) => return Ok(None),
                Err(_) => None,
            };

            let Some(n) = n else {
                // Starved: either everything queued went out and peers need
                // a reminder, or connections have to be rebuilt first.
                if self.manager.have_delivered() {
                    self.send_notifications();
                } else {
                    self.manager.connect_all();
                }

                not_timeout = (not_timeout * 2).min(self.config.max_notification_interval());
                info!("Notification time out: {} ms", not_timeout.as_millis());
                continue;
            };

            if !self.peer.is_voter(n.sid) {
                warn!("Ignoring notification from non-cluster member {}", n.sid);
                continue;
            }

            match n.state {
                ServerState::Looking => {
                    if let Some(end_vote) = self
                        .on_looking_notification(&n, &mut recvset, &mut rx)
                        .await?
                    {
                        return Ok(Some(end_vote));
                    }
                }
                ServerState::Observing => {
                    debug!("Notification from observer: {}", n.sid);
                }
                ServerState::Following | ServerState::Leading => {
                    if let Some(end_vote) =
                        self.on_settled_notification(&n, &mut recvset, &mut outofelection, &mut rx)
                    {
                        return Ok(Some(end_vote));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Handles a notification from a peer that is itself still looking.
    /// Returns the decided vote once this round terminates.
    async fn on_looking_notification(
        &self,
        n: &Notification,
        recvset: &mut HashMap<i64, Vote>,
        rx: &mut TrackedReceiver<Notification>,
    ) -> Result<Option<Vote>> {
        if n.election_epoch > self.shared.logical_clock() {
            // The sender is in a later round: adopt its clock, restart the
            // tally, and re-vote from our initial position.
            self.shared.set_logical_clock(n.election_epoch);
            recvset.clear();

            let (init_id, init_zxid, init_epoch) = self.initial_vote()?;
            if self.total_order_predicate(
                n.leader,
                n.zxid,
                n.peer_epoch,
                init_id,
                init_zxid,
                init_epoch,
            ) {
                self.shared.update_proposal(n.leader, n.zxid, n.peer_epoch);
            } else {
                self.shared.update_proposal(init_id, init_zxid, init_epoch);
            }
            self.send_notifications();
        } else if n.election_epoch < self.shared.logical_clock() {
            debug!(
                "Notification election epoch is smaller than logicalclock. \
                 n.electionEpoch = {:#x}, logicalclock={:#x}",
                n.election_epoch,
                self.shared.logical_clock()
            );
            return Ok(None);
        } else {
            let cur = self.shared.proposal_vote();
            if self.total_order_predicate(
                n.leader,
                n.zxid,
                n.peer_epoch,
                cur.id,
                cur.zxid,
                cur.peer_epoch,
            ) {
                self.shared.update_proposal(n.leader, n.zxid, n.peer_epoch);
                self.send_notifications();
            }
        }

        debug!(
            "Adding vote: from={}, proposed leader={}, proposed zxid={:#x}, \
             proposed election epoch={:#x}",
            n.sid, n.leader, n.zxid, n.election_epoch
        );
        recvset.insert(
            n.sid,
            Vote::with_epochs(n.leader, n.zxid, n.election_epoch, n.peer_epoch),
        );

        let cur = self.shared.proposal_vote();
        let proposed = Vote::with_epochs(
            cur.id,
            cur.zxid,
            self.shared.logical_clock(),
            cur.peer_epoch,
        );
        if !self.term_predicate(recvset, &proposed) {
            return Ok(None);
        }

        // A quorum supports the proposal. Drain the queue for one more
        // finalize window: any vote that precedes the proposal reopens the
        // race, everything else is consumed.
        let mut abandoned = false;
        loop {
            match timeout(self.config.finalize_wait(), rx.recv()).await {
                Err(_) => break,
                Ok(None) => return Ok(None),
                Ok(Some(n2)) => {
                    let cur = self.shared.proposal_vote();
                    if self.total_order_predicate(
                        n2.leader,
                        n2.zxid,
                        n2.peer_epoch,
                        cur.id,
                        cur.zxid,
                        cur.peer_epoch,
                    ) {
                        self.recv_tx.offer(n2);
                        abandoned = true;
                        break;
                    }
                }
            }
        }
        if abandoned {
            return Ok(None);
        }

        let cur = self.shared.proposal_vote();
        self.peer.set_state(if cur.id == self.peer.id() {
            ServerState::Leading
        } else {
            self.learning_state()
        });

        let end_vote = Vote::with_epochs(
            cur.id,
            cur.zxid,
            self.shared.logical_clock(),
            cur.peer_epoch,
        );
        self.leave_instance(&end_vote, rx);
        Ok(Some(end_vote))
    }

    /// Handles a notification from a peer that has already settled as
    /// FOLLOWING or LEADING.
    fn on_settled_notification(
        &self,
        n: &Notification,
        recvset: &mut HashMap<i64, Vote>,
        outofelection: &mut HashMap<i64, Vote>,
        rx: &mut TrackedReceiver<Notification>,
    ) -> Option<Vote> {
        // Consider all notifications from the same epoch together: they
        // still count toward this round's tally.
        if n.election_epoch == self.shared.logical_clock() {
            recvset.insert(
                n.sid,
                Vote::with_epochs(n.leader, n.zxid, n.election_epoch, n.peer_epoch),
            );
            if self.ooe_predicate(recvset, outofelection, n) {
                self.peer.set_state(if n.leader == self.peer.id() {
                    ServerState::Leading
                } else {
                    self.learning_state()
                });

                let end_vote =
                    Vote::with_epochs(n.leader, n.zxid, n.election_epoch, n.peer_epoch);
                self.leave_instance(&end_vote, rx);
                return Some(end_vote);
            }
        }

        // Before joining an established ensemble, verify that a majority is
        // following the same leader and that the leader itself says so.
        outofelection.insert(n.sid, n.vote());
        if self.ooe_predicate(outofelection, outofelection, n) {
            self.shared.set_logical_clock(n.election_epoch);
            self.peer.set_state(if n.leader == self.peer.id() {
                ServerState::Leading
            } else {
                self.learning_state()
            });

            let end_vote = Vote::with_epochs(n.leader, n.zxid, n.election_epoch, n.peer_epoch);
            self.leave_instance(&end_vote, rx);
            return Some(end_vote);
        }

        None
    }

    /// Sends one notification with the current proposal to every member of
    /// the voting view, the local peer included.
    fn send_notifications(&self) {
        let v = self.shared.proposal_vote();
        let clock = self.shared.logical_clock();

        for server in self.peer.voting_view().values() {
            debug!(
                "Sending Notification: {} (n.leader), {:#x} (n.zxid), {:#x} (n.round), \
                 {} (recipient), {} (myid), {:#x} (n.peerEpoch)",
                v.id,
                v.zxid,
                clock,
                server.id,
                self.peer.id(),
                v.peer_epoch
            );
            self.send_tx.offer(ToSend {
                leader: v.id,
                zxid: v.zxid,
                election_epoch: clock,
                peer_epoch: v.peer_epoch,
                state: ServerState::Looking,
                sid: server.id,
            });
        }
    }

    /// Whether the candidate `(new_id, new_zxid, new_epoch)` precedes the
    /// incumbent. Non-voting peers never win.
    pub(crate) fn total_order_predicate(
        &self,
        new_id: i64,
        new_zxid: i64,
        new_epoch: i64,
        cur_id: i64,
        cur_zxid: i64,
        cur_epoch: i64,
    ) -> bool {
        debug!(
            "id: {}, proposed id: {}, zxid: {:#x}, proposed zxid: {:#x}",
            new_id, cur_id, new_zxid, cur_zxid
        );
        if self.peer.quorum_verifier().weight(new_id) == 0 {
            return false;
        }

        // Highest acknowledged epoch wins, then the most durable zxid, then
        // the sid as a deterministic tiebreak.
        (new_epoch > cur_epoch)
            || (new_epoch == cur_epoch
                && (new_zxid > cur_zxid || (new_zxid == cur_zxid && new_id > cur_id)))
    }

    /// Whether the votes stored in `votes` that equal `vote` form a quorum.
    pub(crate) fn term_predicate(
        &self,
        votes: &HashMap<i64, Vote>,
        vote: &Vote,
    ) -> bool {
        let mut set: HashSet<i64> = HashSet::new();

        // First make the views consistent: peers may still advertise
        // different zxids for a server depending on timing.
        for (sid, v) in votes {
            if vote == v {
                set.insert(*sid);
            }
        }

        self.peer.quorum_verifier().contains_quorum(&set)
    }

    /// Whether the claimed leader is actually leading: either it is this
    /// peer in the current round, or its own vote in `votes` says LEADING.
    /// This keeps a crashed ex-leader from being re-elected over and over.
    pub(crate) fn check_leader(
        &self,
        votes: &HashMap<i64, Vote>,
        leader: i64,
        election_epoch: i64,
    ) -> bool {
        if leader != self.peer.id() {
            match votes.get(&leader) {
                None => false,
                Some(v) => v.state == ServerState::Leading,
            }
        } else {
            self.shared.logical_clock() == election_epoch
        }
    }

    pub(crate) fn ooe_predicate(
        &self,
        recv: &HashMap<i64, Vote>,
        ooe: &HashMap<i64, Vote>,
        n: &Notification,
    ) -> bool {
        self.term_predicate(recv, &n.vote())
            && self.check_leader(ooe, n.leader, n.election_epoch)
    }

    /// A non-leader finalization lands on FOLLOWING for participants and
    /// OBSERVING for observers.
    fn learning_state(&self) -> ServerState {
        match self.peer.learner_type() {
            LearnerType::Participant => {
                debug!("I'm a participant: {}", self.peer.id());
                ServerState::Following
            }
            LearnerType::Observer => {
                debug!("I'm an observer: {}", self.peer.id());
                ServerState::Observing
            }
        }
    }

    /// The initial `(id, zxid, peer epoch)` this peer votes for itself.
    /// Observers vote a sentinel that loses to every participant.
    fn initial_vote(&self) -> Result<(i64, i64, i64)> {
        match self.peer.learner_type() {
            LearnerType::Participant => {
                let epoch = self
                    .peer
                    .current_epoch()
                    .map_err(|source| ElectionError::EpochReadFailure { source })?;
                Ok((self.peer.id(), self.peer.last_logged_zxid(), epoch))
            }
            LearnerType::Observer => Ok((OBSERVER_ID, OBSERVER_ID, OBSERVER_ID)),
        }
    }

    fn leave_instance(
        &self,
        v: &Vote,
        rx: &mut TrackedReceiver<Notification>,
    ) {
        debug!(
            "About to leave FLE instance: leader={}, zxid={:#x}, my id={}, my state={}",
            v.id,
            v.zxid,
            self.peer.id(),
            self.peer.state()
        );
        rx.drain();
    }
}

#[cfg(test)]
impl FastLeaderElection {
    /// Places a notification on the receive queue as if the messenger had
    /// decoded it.
    pub(crate) fn inject_notification(
        &self,
        n: Notification,
    ) {
        self.recv_tx.offer(n);
    }

    pub(crate) fn shared_state(&self) -> &ProposalState {
        &self.shared
    }
}
