//! Abstract peer transport.
//!
//! Leader election does not open sockets itself; it drives a connection
//! manager owned by the enclosing server. The manager is responsible for
//! connection establishment, per-peer send buffering and reconnect policy.
//! Transient I/O faults never surface here directly, they only show up as
//! `have_delivered() == false`, which makes the election loop ask for a
//! reconnect sweep.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use crate::message::PeerMessage;

/// Contract the connection manager exposes to leader election.
///
/// The transport must preserve per-sender FIFO ordering; no ordering across
/// senders is assumed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    /// Queues `payload` for delivery to `sid`. Delivery is best effort; a
    /// send to an unreachable peer is buffered or dropped by the manager.
    fn send(
        &self,
        sid: i64,
        payload: Bytes,
    );

    /// Next inbound frame, or `None` once `timeout` elapses.
    async fn poll_recv(
        &self,
        timeout: Duration,
    ) -> Option<PeerMessage>;

    /// Whether at least one queued message has been handed to the wire
    /// since the last check. `false` makes the caller request reconnects.
    fn have_delivered(&self) -> bool;

    /// Asks the manager to (re)establish connections to every known peer.
    /// Must return without blocking on connection attempts.
    fn connect_all(&self);

    /// Shuts the manager down. Subsequent polls return `None`.
    fn halt(&self);
}
