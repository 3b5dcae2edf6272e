//! In-process test fabric: a loopback connection-manager hub and fixed
//! transaction-log views, enough to run whole elections inside one runtime.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;

use fle_core::ConnectionManager;
use fle_core::LearnerType;
use fle_core::MajorityQuorumVerifier;
use fle_core::PeerMessage;
use fle_core::QuorumPeer;
use fle_core::QuorumServer;
use fle_core::TxnLogView;

/// Routes frames between in-process peers. Frames to unknown sids are
/// dropped, which doubles as the "unreachable peer" case.
pub struct InProcessHub {
    inboxes: Mutex<HashMap<i64, mpsc::UnboundedSender<PeerMessage>>>,
}

impl InProcessHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: Mutex::new(HashMap::new()),
        })
    }

    /// Registers `sid` and returns its connection manager.
    pub fn connect(
        self: &Arc<Self>,
        sid: i64,
    ) -> Arc<InProcessCnx> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().unwrap().insert(sid, tx);
        Arc::new(InProcessCnx {
            sid,
            hub: self.clone(),
            rx: tokio::sync::Mutex::new(rx),
            halted: AtomicBool::new(false),
        })
    }

    /// Registers `sid` without a peer behind it and hands back the raw
    /// inbox, so a test can watch what gets delivered there.
    pub fn tap(
        self: &Arc<Self>,
        sid: i64,
    ) -> mpsc::UnboundedReceiver<PeerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().unwrap().insert(sid, tx);
        rx
    }

    /// Drops a frame into `to`'s inbox as if `from` had sent it.
    pub fn inject(
        &self,
        to: i64,
        from: i64,
        payload: Bytes,
    ) {
        self.route(from, to, payload);
    }

    fn route(
        &self,
        from: i64,
        to: i64,
        payload: Bytes,
    ) {
        if let Some(tx) = self.inboxes.lock().unwrap().get(&to) {
            let _ = tx.send(PeerMessage { sid: from, payload });
        }
    }
}

/// Per-peer connection manager backed by the hub. Self-addressed frames
/// loop straight back into the local inbox.
pub struct InProcessCnx {
    sid: i64,
    hub: Arc<InProcessHub>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PeerMessage>>,
    halted: AtomicBool,
}

#[async_trait]
impl ConnectionManager for InProcessCnx {
    fn send(
        &self,
        sid: i64,
        payload: Bytes,
    ) {
        if !self.halted.load(Ordering::SeqCst) {
            self.hub.route(self.sid, sid, payload);
        }
    }

    async fn poll_recv(
        &self,
        poll_timeout: Duration,
    ) -> Option<PeerMessage> {
        if self.halted.load(Ordering::SeqCst) {
            tokio::time::sleep(poll_timeout).await;
            return None;
        }
        let mut rx = self.rx.lock().await;
        match timeout(poll_timeout, rx.recv()).await {
            Ok(message) => message,
            Err(_) => None,
        }
    }

    fn have_delivered(&self) -> bool {
        true
    }

    fn connect_all(&self) {}

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}

/// Transaction-log view with fixed answers.
pub struct FixedTxnLog {
    zxid: i64,
    epoch: i64,
}

impl FixedTxnLog {
    pub fn new(
        zxid: i64,
        epoch: i64,
    ) -> Self {
        Self { zxid, epoch }
    }
}

impl TxnLogView for FixedTxnLog {
    fn last_logged_zxid(&self) -> i64 {
        self.zxid
    }

    fn current_epoch(&self) -> io::Result<i64> {
        Ok(self.epoch)
    }
}

pub fn make_view(sids: &[i64]) -> HashMap<i64, QuorumServer> {
    sids.iter()
        .map(|sid| (*sid, QuorumServer::new(*sid, format!("127.0.0.1:{}", 2888 + sid))))
        .collect()
}

pub fn make_peer(
    sid: i64,
    voters: &[i64],
    zxid: i64,
    epoch: i64,
) -> Arc<QuorumPeer> {
    Arc::new(QuorumPeer::new(
        sid,
        LearnerType::Participant,
        make_view(voters),
        Arc::new(MajorityQuorumVerifier::new(voters.iter().copied())),
        Arc::new(FixedTxnLog::new(zxid, epoch)),
    ))
}
