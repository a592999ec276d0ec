//! Backup takeover (§4.5): a `RecoveryManager` watches `JOB_HEARTBEAT`
//! traffic for jobs this node is registered as backup for, and re-executes
//! from the latest checkpoint if the primary goes quiet for
//! `heartbeat_timeout`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mesh_core::{Job, NodeId};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::harness::ExecutionHarness;

pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

struct BackupEntry {
    primary: NodeId,
    job: Job,
    last_heartbeat: Instant,
}

/// Tracks jobs this node backs up and the primary's last observed
/// heartbeat, escalating to a takeover execution when the primary goes
/// silent past the timeout.
pub struct RecoveryManager {
    harness: Arc<ExecutionHarness>,
    backups: DashMap<String, Mutex<BackupEntry>>,
    heartbeat_timeout: Duration,
}

impl RecoveryManager {
    pub fn new(harness: Arc<ExecutionHarness>, heartbeat_timeout: Duration) -> Self {
        Self {
            harness,
            backups: DashMap::new(),
            heartbeat_timeout,
        }
    }

    /// Called when this node observes a `JOB_CLAIM` naming it as
    /// `backup_node_id`.
    pub fn register_backup(&self, job: Job, primary: NodeId) {
        let job_id = job.job_id.clone();
        self.backups.insert(
            job_id,
            Mutex::new(BackupEntry {
                primary,
                job,
                last_heartbeat: Instant::now(),
            }),
        );
    }

    /// Called on every observed `JOB_HEARTBEAT`, from any node.
    pub fn observe_heartbeat(&self, job_id: &str, from: &NodeId) {
        let Some(entry) = self.backups.get(job_id) else { return };
        let mut state = entry.lock();
        if state.primary == *from {
            state.last_heartbeat = Instant::now();
        }
    }

    /// Called when the job completes (from any node) or is otherwise
    /// settled, so this node stops tracking it as a backup.
    pub fn clear(&self, job_id: &str) {
        self.backups.remove(job_id);
    }

    /// One scan tick: takes over any job whose primary has missed the
    /// heartbeat timeout.
    pub fn scan_once(self: &Arc<Self>) {
        let mut stale: HashMap<String, Job> = HashMap::new();
        for entry in self.backups.iter() {
            let state = entry.value().lock();
            if state.last_heartbeat.elapsed() > self.heartbeat_timeout {
                stale.insert(entry.key().clone(), state.job.clone());
            }
        }
        for (job_id, job) in stale {
            warn!(job_id, "primary heartbeat missed, taking over execution");
            self.backups.remove(&job_id);
            if let Err(e) = self.harness.execute(job) {
                warn!(job_id, error = %e, "backup takeover failed to start");
            } else {
                info!(job_id, "backup takeover execution started");
            }
        }
    }

    pub fn spawn_scan_loop(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                manager.scan_once();
            }
        });
    }
}
