//! Messenger: the pair of long-lived workers between the election loop and
//! the connection manager.
//!
//! The sender worker drains the send queue, encodes each notification and
//! hands it to the manager. The receiver worker pulls raw frames from the
//! manager, decodes them and applies the reply policies: non-voters are
//! answered with the peer's current vote, lagging voters get a catch-up
//! copy of the in-round proposal, and searchers arriving after this peer
//! has settled are answered with the finalized vote. Only then does a
//! notification reach the election loop's receive queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::ProposalState;
use super::queue::TrackedReceiver;
use super::queue::TrackedSender;
use crate::codec::build_notification_msg;
use crate::codec::parse_notification;
use crate::errors::CodecError;
use crate::message::Notification;
use crate::message::PeerMessage;
use crate::message::ToSend;
use crate::peer::QuorumPeer;
use crate::transport::ConnectionManager;
use crate::vote::ServerState;

pub(crate) struct Messenger {
    shutdown_tx: watch::Sender<bool>,
    #[allow(dead_code)]
    sender_handle: JoinHandle<()>,
    #[allow(dead_code)]
    receiver_handle: JoinHandle<()>,
}

impl Messenger {
    /// Spawns the sender and receiver workers. Must be called within a
    /// Tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start(
        peer: Arc<QuorumPeer>,
        manager: Arc<dyn ConnectionManager>,
        shared: Arc<ProposalState>,
        send_rx: TrackedReceiver<ToSend>,
        send_tx: TrackedSender<ToSend>,
        recv_tx: TrackedSender<Notification>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sender = SenderWorker {
            manager: manager.clone(),
            send_rx,
            shutdown: shutdown_rx.clone(),
        };
        let receiver = ReceiverWorker {
            peer,
            manager,
            shared,
            send_tx,
            recv_tx,
            shutdown: shutdown_rx,
            poll_interval,
        };

        Self {
            shutdown_tx,
            sender_handle: tokio::spawn(sender.run()),
            receiver_handle: tokio::spawn(receiver.run()),
        }
    }

    /// Stops both workers at their next suspension point.
    pub(crate) fn halt(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Dequeues outbound notifications and queues them on the manager.
pub(crate) struct SenderWorker {
    pub(crate) manager: Arc<dyn ConnectionManager>,
    pub(crate) send_rx: TrackedReceiver<ToSend>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl SenderWorker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                m = self.send_rx.recv() => {
                    let Some(m) = m else { break };
                    self.process(&m);
                }
            }
        }
        info!("WorkerSender is down");
    }

    pub(crate) fn process(
        &self,
        m: &ToSend,
    ) {
        let payload = build_notification_msg(m);
        self.manager.send(m.sid, payload);
    }
}

/// Receives frames from the connection manager and processes them.
pub(crate) struct ReceiverWorker {
    pub(crate) peer: Arc<QuorumPeer>,
    pub(crate) manager: Arc<dyn ConnectionManager>,
    pub(crate) shared: Arc<ProposalState>,
    pub(crate) send_tx: TrackedSender<ToSend>,
    pub(crate) recv_tx: TrackedSender<Notification>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) poll_interval: Duration,
}

impl ReceiverWorker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                response = self.manager.poll_recv(self.poll_interval) => {
                    // A poll timeout is not an error.
                    let Some(message) = response else { continue };
                    self.process(message);
                }
            }
        }
        info!("WorkerReceiver is down");
    }

    /// Decodes one frame and applies the reply policies. Never fails the
    /// worker: a bad message is dropped and the loop keeps going.
    pub(crate) fn process(
        &self,
        message: PeerMessage,
    ) {
        let n = match parse_notification(message.sid, &message.payload) {
            Ok(n) => n,
            Err(CodecError::ShortMessage { len }) => {
                error!("Got a short response: {}", len);
                return;
            }
            Err(CodecError::UnknownState { ordinal }) => {
                debug!(
                    "Dropping notification with unrecognized state {} from {}",
                    ordinal, message.sid
                );
                return;
            }
        };

        info!("Notification: {}, {} (my state)", n, self.peer.state());

        // A message from outside the voting view gets answered with what
        // this peer currently believes; that is how observers learn the
        // leader. The message itself is discarded.
        if !self.peer.is_voter(n.sid) {
            let Some(current) = self.peer.current_vote() else {
                debug!("No current vote yet, nothing to tell {}", n.sid);
                return;
            };
            self.send_tx.offer(ToSend {
                leader: current.id,
                zxid: current.zxid,
                election_epoch: self.shared.logical_clock(),
                peer_epoch: current.peer_epoch,
                state: self.peer.state(),
                sid: n.sid,
            });
            return;
        }

        if self.peer.state() == ServerState::Looking {
            self.recv_tx.offer(n);

            // Send a notification back if the peer that sent this message
            // is also looking and its logical clock is lagging behind.
            if n.state == ServerState::Looking && n.election_epoch < self.shared.logical_clock() {
                let v = self.shared.proposal_vote();
                self.send_tx.offer(ToSend {
                    leader: v.id,
                    zxid: v.zxid,
                    election_epoch: self.shared.logical_clock(),
                    peer_epoch: v.peer_epoch,
                    state: self.peer.state(),
                    sid: n.sid,
                });
            }
        } else if n.state == ServerState::Looking {
            // This peer has settled; tell the searcher what it believes to
            // be the leader. Senders that predate the versioned format get
            // the saved backward-compatible vote.
            let reply = if n.version > 0x0 {
                self.peer.current_vote()
            } else {
                self.peer.bc_vote()
            };
            let Some(current) = reply else {
                debug!("No finalized vote yet, nothing to tell {}", n.sid);
                return;
            };

            debug!(
                "Sending new notification. My id = {} recipient={} zxid={:#x} leader={}",
                self.peer.id(),
                n.sid,
                current.zxid,
                current.id
            );
            self.send_tx.offer(ToSend {
                leader: current.id,
                zxid: current.zxid,
                election_epoch: current.election_epoch,
                peer_epoch: current.peer_epoch,
                state: self.peer.state(),
                sid: n.sid,
            });
        }
    }
}
