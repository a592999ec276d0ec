use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{NodeId, Timestamp};

/// A job submitted by a client. Immutable once broadcast: the submitter
/// asserts `job_id` uniqueness, duplicates are dropped on receipt by every
/// other module that sees one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub job_type: String,
    /// In [0, 1].
    pub priority: f64,
    pub payment: f64,
    /// Unix time the job is due.
    pub deadline: Timestamp,
    pub requirements: BTreeSet<String>,
    /// Opaque payload for the runner; the coordination layer never inspects it.
    pub payload: Vec<u8>,
    pub verify: bool,
    #[serde(default)]
    pub verifiers: Vec<NodeId>,
    /// Wall-clock time the submitter stamped the broadcast. The auction
    /// deadline is anchored to this, not to any receiver's local clock.
    pub timestamp: Timestamp,
}

impl Job {
    pub fn is_valid(&self) -> bool {
        !self.job_id.is_empty()
            && (0.0..=1.0).contains(&self.priority)
            && self.payment >= 0.0
    }
}

/// A bid for a job. A node keeps at most one outgoing bid per `job_id`;
/// incoming bids accumulate per `job_id`, de-duplicated by `(job_id, node_id)`
/// keeping the higher score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bid {
    pub job_id: String,
    pub node_id: NodeId,
    /// In [0, 1).
    pub score: f64,
    pub stake_amount: f64,
    pub estimated_time: f64,
    pub timestamp: Timestamp,
}

impl Bid {
    /// Sort key for deterministic winner determination: highest score wins,
    /// ties broken by the lexicographically smallest node id.
    pub fn sort_key(&self) -> (std::cmp::Reverse<ordered_float::NotNan<f64>>, &str) {
        let score = ordered_float::NotNan::new(self.score).unwrap_or(ordered_float::NotNan::new(0.0).unwrap());
        (std::cmp::Reverse(score), self.node_id.as_str())
    }
}

/// A finite `f64` wrapper that implements `Ord`, for use as a sort key.
pub mod ordered_float {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct NotNan<T>(T);

    impl NotNan<f64> {
        pub fn new(v: f64) -> Result<Self, &'static str> {
            if v.is_nan() {
                Err("value is NaN")
            } else {
                Ok(NotNan(v))
            }
        }

        pub fn into_inner(self) -> f64 {
            self.0
        }
    }

    impl Eq for NotNan<f64> {}

    impl PartialOrd for NotNan<f64> {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for NotNan<f64> {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0.partial_cmp(&other.0).expect("NotNan invariant upheld at construction")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(node_id: &str, score: f64) -> Bid {
        Bid {
            job_id: "j1".into(),
            node_id: node_id.into(),
            score,
            stake_amount: 10.0,
            estimated_time: 1.0,
            timestamp: 0.0,
        }
    }

    #[test]
    fn winner_determined_by_score_then_node_id() {
        let mut bids = vec![bid("zz", 0.5), bid("aa", 0.9), bid("bb", 0.9)];
        bids.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        assert_eq!(bids[0].node_id, "aa");
    }

    #[test]
    fn job_validity() {
        let mut job = Job {
            job_id: "j1".into(),
            job_type: "shell".into(),
            priority: 0.5,
            payment: 10.0,
            deadline: 1000.0,
            requirements: BTreeSet::new(),
            payload: vec![],
            verify: false,
            verifiers: vec![],
            timestamp: 0.0,
        };
        assert!(job.is_valid());
        job.priority = 1.5;
        assert!(!job.is_valid());
    }
}
