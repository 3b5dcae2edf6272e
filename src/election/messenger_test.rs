//! Unit tests for the messenger reply policies.
//!
//! These tests verify:
//! - Non-voters are answered with the peer's current vote
//! - Lagging searchers receive a catch-up copy of the proposal
//! - Searchers arriving after this peer settled get the finalized vote,
//!   in the format their sender understands
//! - Malformed frames are dropped without reaching the election loop

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use super::ProposalState;
use super::messenger::ReceiverWorker;
use super::messenger::SenderWorker;
use super::queue::TrackedReceiver;
use super::queue::tracked_channel;
use crate::LearnerType;
use crate::MajorityQuorumVerifier;
use crate::Notification;
use crate::PeerMessage;
use crate::QuorumServer;
use crate::ServerState;
use crate::ToSend;
use crate::Vote;
use crate::build_notification_msg;
use crate::constants::WORKER_POLL_INTERVAL;
use crate::parse_notification;
use crate::peer::MockTxnLogView;
use crate::peer::QuorumPeer;
use crate::transport::MockConnectionManager;

// ============================================================================
// Helper Functions
// ============================================================================

fn create_view(sids: &[i64]) -> HashMap<i64, QuorumServer> {
    sids.iter()
        .map(|sid| (*sid, QuorumServer::new(*sid, format!("127.0.0.1:{}", 2888 + sid))))
        .collect()
}

fn create_peer(
    id: i64,
    voters: &[i64],
) -> Arc<QuorumPeer> {
    Arc::new(QuorumPeer::new(
        id,
        LearnerType::Participant,
        create_view(voters),
        Arc::new(MajorityQuorumVerifier::new(voters.iter().copied())),
        Arc::new(MockTxnLogView::new()),
    ))
}

struct WorkerHarness {
    worker: ReceiverWorker,
    send_rx: TrackedReceiver<ToSend>,
    recv_rx: TrackedReceiver<Notification>,
    _shutdown_tx: watch::Sender<bool>,
}

fn create_receiver_worker(peer: Arc<QuorumPeer>) -> WorkerHarness {
    let (send_tx, send_rx) = tracked_channel();
    let (recv_tx, recv_rx) = tracked_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ReceiverWorker {
        peer,
        manager: Arc::new(MockConnectionManager::new()),
        shared: Arc::new(ProposalState::new()),
        send_tx,
        recv_tx,
        shutdown: shutdown_rx,
        poll_interval: WORKER_POLL_INTERVAL,
    };

    WorkerHarness {
        worker,
        send_rx,
        recv_rx,
        _shutdown_tx: shutdown_tx,
    }
}

fn create_frame(
    from: i64,
    state: ServerState,
    leader: i64,
    zxid: i64,
    election_epoch: i64,
    peer_epoch: i64,
) -> PeerMessage {
    let payload = build_notification_msg(&ToSend {
        leader,
        zxid,
        election_epoch,
        peer_epoch,
        state,
        sid: 0,
    });
    PeerMessage {
        sid: from,
        payload,
    }
}

// ============================================================================
// Non-voter policy
// ============================================================================

#[tokio::test]
async fn test_non_voter_gets_current_vote_reply() {
    let peer = create_peer(1, &[1, 2, 3]);
    peer.set_current_vote(Vote::with_epochs(3, 0x300, 4, 2));
    let mut h = create_receiver_worker(peer);
    h.worker.shared.set_logical_clock(4);

    h.worker
        .process(create_frame(99, ServerState::Looking, 99, 0, 1, 0));

    let reply = h.send_rx.try_recv().expect("observer should be answered");
    assert_eq!(reply.sid, 99);
    assert_eq!(reply.leader, 3);
    assert_eq!(reply.zxid, 0x300);
    assert_eq!(reply.election_epoch, 4, "stamped with the local clock");
    assert!(h.recv_rx.try_recv().is_none(), "message itself is discarded");
}

#[tokio::test]
async fn test_non_voter_without_current_vote_gets_nothing() {
    let peer = create_peer(1, &[1, 2, 3]);
    let mut h = create_receiver_worker(peer);

    h.worker
        .process(create_frame(99, ServerState::Looking, 99, 0, 1, 0));

    assert!(h.send_rx.try_recv().is_none());
    assert!(h.recv_rx.try_recv().is_none());
}

// ============================================================================
// Voter policy while the local peer is LOOKING
// ============================================================================

#[tokio::test]
async fn test_looking_voter_is_enqueued() {
    let peer = create_peer(1, &[1, 2, 3]);
    let mut h = create_receiver_worker(peer);
    h.worker.shared.set_logical_clock(2);

    h.worker
        .process(create_frame(2, ServerState::Looking, 2, 0x20, 2, 1));

    let n = h.recv_rx.try_recv().expect("notification reaches the loop");
    assert_eq!(n.sid, 2);
    assert_eq!(n.leader, 2);
    assert!(
        h.send_rx.try_recv().is_none(),
        "an in-round sender needs no catch-up"
    );
}

#[tokio::test]
async fn test_lagging_looking_voter_gets_catch_up() {
    let peer = create_peer(1, &[1, 2, 3]);
    let mut h = create_receiver_worker(peer);
    h.worker.shared.set_logical_clock(5);
    h.worker.shared.update_proposal(3, 0x300, 2);

    h.worker
        .process(create_frame(2, ServerState::Looking, 2, 0x20, 3, 1));

    assert!(h.recv_rx.try_recv().is_some());
    let reply = h.send_rx.try_recv().expect("laggard should be caught up");
    assert_eq!(reply.sid, 2);
    assert_eq!(reply.leader, 3);
    assert_eq!(reply.election_epoch, 5);
}

// ============================================================================
// Voter policy once the local peer has settled
// ============================================================================

#[tokio::test]
async fn test_settled_peer_replies_with_finalized_vote() {
    let peer = create_peer(1, &[1, 2, 3]);
    peer.set_state(ServerState::Following);
    peer.set_current_vote(Vote::with_epochs(2, 0x200, 8, 3));
    peer.set_bc_vote(Vote::with_epochs(9, 0x900, 8, 3));
    let mut h = create_receiver_worker(peer);

    h.worker
        .process(create_frame(3, ServerState::Looking, 3, 0x30, 9, 3));

    assert!(
        h.recv_rx.try_recv().is_none(),
        "nothing reaches the loop once settled"
    );
    let reply = h.send_rx.try_recv().expect("searcher should be answered");
    assert_eq!(reply.leader, 2, "modern senders get the current vote");
    assert_eq!(reply.election_epoch, 8, "round of the finalized vote, not the clock");
    assert_eq!(reply.state, ServerState::Following);
}

#[tokio::test]
async fn test_settled_peer_replies_with_bc_vote_for_legacy_sender() {
    let peer = create_peer(1, &[1, 2, 3]);
    peer.set_state(ServerState::Following);
    peer.set_current_vote(Vote::with_epochs(2, 0x200, 8, 3));
    peer.set_bc_vote(Vote::with_epochs(9, 0x900, 8, 3));
    let mut h = create_receiver_worker(peer);

    // A 36-byte frame decodes with version 0.
    let mut frame = create_frame(3, ServerState::Looking, 3, 0x30, 9, 3);
    frame.payload = frame.payload.slice(..36);
    h.worker.process(frame);

    let reply = h.send_rx.try_recv().expect("searcher should be answered");
    assert_eq!(reply.leader, 9, "legacy senders get the saved vote");
}

#[tokio::test]
async fn test_settled_peer_ignores_settled_sender() {
    let peer = create_peer(1, &[1, 2, 3]);
    peer.set_state(ServerState::Leading);
    peer.set_current_vote(Vote::with_epochs(1, 0x100, 8, 3));
    let mut h = create_receiver_worker(peer);

    h.worker
        .process(create_frame(2, ServerState::Following, 1, 0x100, 8, 3));

    assert!(h.send_rx.try_recv().is_none());
    assert!(h.recv_rx.try_recv().is_none());
}

// ============================================================================
// Malformed frames
// ============================================================================

#[tokio::test]
async fn test_short_frame_is_dropped() {
    let peer = create_peer(1, &[1, 2, 3]);
    let mut h = create_receiver_worker(peer);

    h.worker.process(PeerMessage {
        sid: 2,
        payload: bytes::Bytes::from_static(&[0u8; 10]),
    });

    assert!(h.send_rx.try_recv().is_none());
    assert!(h.recv_rx.try_recv().is_none());
}

#[tokio::test]
async fn test_unknown_state_frame_is_dropped() {
    let peer = create_peer(1, &[1, 2, 3]);
    let mut h = create_receiver_worker(peer);

    let mut frame = create_frame(2, ServerState::Looking, 2, 0x20, 1, 1);
    let mut raw = frame.payload.to_vec();
    raw[3] = 9;
    frame.payload = bytes::Bytes::from(raw);
    h.worker.process(frame);

    assert!(h.send_rx.try_recv().is_none());
    assert!(h.recv_rx.try_recv().is_none());
}

// ============================================================================
// Sender worker
// ============================================================================

#[tokio::test]
async fn test_sender_worker_encodes_and_forwards() {
    let mut manager = MockConnectionManager::new();
    manager
        .expect_send()
        .withf(|sid, payload| {
            let n = parse_notification(1, payload).unwrap();
            *sid == 2 && n.leader == 3 && n.zxid == 0x300 && n.state == ServerState::Looking
        })
        .times(1)
        .return_const(());

    let (_send_tx, send_rx) = tracked_channel::<ToSend>();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = SenderWorker {
        manager: Arc::new(manager),
        send_rx,
        shutdown: shutdown_rx,
    };

    worker.process(&ToSend {
        leader: 3,
        zxid: 0x300,
        election_epoch: 1,
        peer_epoch: 2,
        state: ServerState::Looking,
        sid: 2,
    });
}
