//! Depth-tracked unbounded FIFO queues.
//!
//! The send and receive queues sit between the election loop and the
//! messenger workers. They are plain unbounded channels plus an exact depth
//! counter, so the emptiness of a queue can be observed from the sending
//! side as well (the receiving halves are consumed by their worker loops).

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

pub(crate) fn tracked_channel<T>() -> (TrackedSender<T>, TrackedReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        TrackedSender {
            tx,
            depth: depth.clone(),
        },
        TrackedReceiver { rx, depth },
    )
}

pub(crate) struct TrackedSender<T> {
    tx: mpsc::UnboundedSender<T>,
    depth: Arc<AtomicUsize>,
}

impl<T> Clone for TrackedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            depth: self.depth.clone(),
        }
    }
}

impl<T> TrackedSender<T> {
    /// Enqueues `item`. Returns false when the receiving half is gone,
    /// which only happens during shutdown.
    pub(crate) fn offer(
        &self,
        item: T,
    ) -> bool {
        // Counted before the send so emptiness is never over-reported while
        // an offer is in flight.
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(item).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.depth.load(Ordering::SeqCst) == 0
    }

    #[allow(dead_code)]
    pub(crate) fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

pub(crate) struct TrackedReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
    depth: Arc<AtomicUsize>,
}

impl<T> TrackedReceiver<T> {
    /// Waits for the next item. `None` means every sender is gone.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await;
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    pub(crate) fn try_recv(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Some(item)
            }
            Err(_) => None,
        }
    }

    /// Discards everything queued so far.
    pub(crate) fn drain(&mut self) {
        while self.try_recv().is_some() {}
    }
}
