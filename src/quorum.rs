//! Quorum membership vocabulary: the voting view and the quorum verifier.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;

/// A peer registry entry. The address is carried for the benefit of real
/// connection managers; the election algorithm itself only consumes the sid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumServer {
    pub id: i64,
    pub addr: String,
}

impl QuorumServer {
    pub fn new(
        id: i64,
        addr: impl Into<String>,
    ) -> Self {
        Self {
            id,
            addr: addr.into(),
        }
    }
}

/// Decides whether a set of sids forms a quorum, and how much weight a
/// single sid carries. Zero-weight peers can never win an election.
pub trait QuorumVerifier: Send + Sync + Debug + 'static {
    fn weight(
        &self,
        sid: i64,
    ) -> i64;

    fn contains_quorum(
        &self,
        set: &HashSet<i64>,
    ) -> bool;
}

/// Weighted-majority verifier. With every voter at weight 1 this is the
/// plain strict-majority rule.
#[derive(Debug, Clone)]
pub struct MajorityQuorumVerifier {
    weights: HashMap<i64, i64>,
    total_weight: i64,
}

impl MajorityQuorumVerifier {
    /// All listed voters carry weight 1.
    pub fn new(voters: impl IntoIterator<Item = i64>) -> Self {
        Self::with_weights(voters.into_iter().map(|sid| (sid, 1)).collect())
    }

    pub fn with_weights(weights: HashMap<i64, i64>) -> Self {
        let total_weight = weights.values().sum();
        Self {
            weights,
            total_weight,
        }
    }
}

impl QuorumVerifier for MajorityQuorumVerifier {
    fn weight(
        &self,
        sid: i64,
    ) -> i64 {
        self.weights.get(&sid).copied().unwrap_or(0)
    }

    fn contains_quorum(
        &self,
        set: &HashSet<i64>,
    ) -> bool {
        if self.total_weight == 0 {
            return false;
        }
        let ack: i64 = set.iter().map(|sid| self.weight(*sid)).sum();
        2 * ack > self.total_weight
    }
}
