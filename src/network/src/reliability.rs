//! ACK-quorum tracking for `broadcast_reliable` (§4.1, §4.4.4). A reliable
//! send registers a waiter keyed by `message_id` before sending; inbound
//! `ACK{ack_message_id}` frames resolve it; the sender polls (or awaits) up
//! to the 2s reliability timeout and compares the ack count against quorum.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use mesh_core::{MessageId, NodeId};
use tokio::sync::Notify;

pub const RELIABILITY_TIMEOUT: Duration = Duration::from_secs(2);

struct Waiter {
    acked_by: DashSet<NodeId>,
    notify: Notify,
}

/// Quorum is ⌈2·|peers|/3⌉ (§4.1).
pub fn quorum_size(peer_count: usize) -> usize {
    ((2 * peer_count) + 2) / 3
}

#[derive(Default)]
pub struct ReliabilityTracker {
    pending: DashMap<MessageId, Arc<Waiter>>,
}

impl ReliabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, message_id: &MessageId) -> Arc<Waiter> {
        let waiter = Arc::new(Waiter {
            acked_by: DashSet::new(),
            notify: Notify::new(),
        });
        self.pending.insert(message_id.clone(), waiter.clone());
        waiter
    }

    /// Called from the inbound pipeline when an `ACK` frame arrives.
    pub fn record_ack(&self, ack_message_id: &str, from: &NodeId) {
        if let Some(waiter) = self.pending.get(ack_message_id) {
            waiter.acked_by.insert(from.clone());
            waiter.notify.notify_waiters();
        }
    }

    /// Waits up to `RELIABILITY_TIMEOUT` for at least `required` distinct
    /// acks, then cleans up the waiter regardless of outcome. Returns the
    /// number of acks actually observed.
    pub async fn wait_for_quorum(&self, message_id: &MessageId, required: usize) -> usize {
        let waiter = self.register(message_id);
        let deadline = tokio::time::Instant::now() + RELIABILITY_TIMEOUT;

        loop {
            if waiter.acked_by.len() >= required {
                break;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let _ = tokio::time::timeout(remaining, waiter.notify.notified()).await;
        }

        let count = waiter.acked_by.len();
        self.pending.remove(message_id);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_size_is_two_thirds_rounded_up() {
        assert_eq!(quorum_size(5), 4);
        assert_eq!(quorum_size(3), 2);
        assert_eq!(quorum_size(1), 1);
        assert_eq!(quorum_size(0), 0);
    }

    #[tokio::test]
    async fn quorum_resolves_as_soon_as_acks_arrive() {
        let tracker = Arc::new(ReliabilityTracker::new());
        let msg_id = "m1".to_string();

        let t2 = tracker.clone();
        let waiter_task = tokio::spawn(async move { t2.wait_for_quorum(&"m1".to_string(), 2).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.record_ack(&msg_id, &"p1".to_string());
        tracker.record_ack(&msg_id, &"p2".to_string());

        let count = waiter_task.await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_quorum_never_reached() {
        let tracker = ReliabilityTracker::new();
        let count = tracker.wait_for_quorum(&"m1".to_string(), 3).await;
        assert_eq!(count, 0);
    }
}
