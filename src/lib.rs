//! # fle-core
//!
//! Pure Fast Leader Election algorithm - for building ZooKeeper-style
//! coordination services.
//!
//! ## When to use this crate
//!
//! - Building a replicated coordination service that needs a leader before
//!   entering its broadcast phase
//! - Need fine-grained control over peer networking and the transaction log
//! - Research or educational purposes
//!
//! ## What this crate provides
//!
//! The per-peer election state machine and its messenger:
//!
//! - **Election loop** - push-based vote exchange that converges on the
//!   peer with the highest `(peer epoch, zxid, sid)` seen by a quorum
//! - **Join path** - peers restarting into an established ensemble adopt
//!   the standing leader without forcing a new round
//! - **Wire codec** - the packed 40-byte notification format, including
//!   the legacy 28-byte decode path
//! - **Backoff** - exponential notification timeout so partitioned peers
//!   do not busy-wait
//!
//! Peer connectivity and the transaction log are **your responsibility**:
//! implement [`ConnectionManager`] and [`TxnLogView`] and hand them to
//! [`FastLeaderElection`] together with the [`QuorumPeer`] context.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fle_core::{ElectionConfig, FastLeaderElection, QuorumPeer};
//!
//! let peer = Arc::new(QuorumPeer::new(my_sid, learner_type, view, verifier, txn_log));
//! let fle = FastLeaderElection::new(peer.clone(), manager, ElectionConfig::default());
//!
//! // Every time the server falls back to LOOKING:
//! if let Some(vote) = fle.look_for_leader().await? {
//!     peer.set_current_vote(vote);
//!     // transition to the role in peer.state()
//! }
//! ```

mod codec;
pub mod config;
mod constants;
mod election;
mod errors;
mod message;
mod metrics;
mod peer;
mod quorum;
mod transport;
mod vote;

pub use codec::*;
pub use config::*;
pub use constants::CURRENT_NOTIFICATION_VERSION;
pub use constants::FINALIZE_WAIT;
pub use constants::MAX_NOTIFICATION_INTERVAL;
pub use constants::WORKER_POLL_INTERVAL;
pub use election::*;
pub use errors::*;
pub use message::*;
pub use metrics::*;
pub use peer::*;
pub use quorum::*;
pub use transport::*;
pub use vote::*;

#[cfg(test)]
mod codec_test;
