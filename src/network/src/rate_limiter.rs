//! Per-sender token bucket rate limiting with blacklist-after-N-violations
//! (§4.1 step 5).

use std::time::Instant;

use dashmap::DashMap;
use mesh_core::NodeId;

pub const DEFAULT_BURST: f64 = 10.0;
pub const DEFAULT_REFILL_PER_SEC: f64 = 2.0;
pub const VIOLATIONS_BEFORE_BLACKLIST: u32 = 3;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    violations: u32,
    blacklisted: bool,
}

pub struct RateLimiter {
    burst: f64,
    refill_per_sec: f64,
    buckets: DashMap<NodeId, Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_REFILL_PER_SEC)
    }
}

impl RateLimiter {
    pub fn new(burst: f64, refill_per_sec: f64) -> Self {
        Self {
            burst,
            refill_per_sec,
            buckets: DashMap::new(),
        }
    }

    /// Attempts to consume one token for `node_id`. Returns `true` if the
    /// message is allowed. A sender that has been blacklisted (three prior
    /// violations) is always denied, independent of current bucket level.
    pub fn allow(&self, node_id: &NodeId) -> bool {
        let mut bucket = self.buckets.entry(node_id.clone()).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: Instant::now(),
            violations: 0,
            blacklisted: false,
        });

        if bucket.blacklisted {
            return false;
        }

        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.burst);
        bucket.last_refill = Instant::now();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            bucket.violations += 1;
            if bucket.violations >= VIOLATIONS_BEFORE_BLACKLIST {
                bucket.blacklisted = true;
            }
            false
        }
    }

    pub fn is_blacklisted(&self, node_id: &NodeId) -> bool {
        self.buckets.get(node_id).map(|b| b.blacklisted).unwrap_or(false)
    }
}
