//! Fast leader election: the election loop and its messenger plumbing.
//!
//! Handles the election mechanics:
//! - Vote broadcasting and catch-up replies
//! - Vote precedence and quorum termination
//! - Joining an ensemble that already has a leader
//! - Notification timeout backoff across partitions

mod fle;
mod messenger;
mod queue;

pub use fle::*;
pub(crate) use messenger::*;

#[cfg(test)]
mod messenger_test;
