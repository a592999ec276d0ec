//! Optional checkpointing for long-running runners (§4.5): a
//! [`ResumableContext`] a runner can use to record progress, and a
//! [`CheckpointManager`] that persists it on a time/progress schedule so a
//! backup node can resume from the latest snapshot after a takeover.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// Checkpoints are written at these progress fractions, in addition to the
/// time-based schedule (§4.5).
const PROGRESS_CHECKPOINTS: [f64; 3] = [0.25, 0.50, 0.75];
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointData {
    pub job_id: String,
    pub progress: f64,
    pub state: Value,
    pub completed_steps: Vec<String>,
    pub current_step: Option<String>,
    pub intermediate_results: HashMap<String, Value>,
}

/// Handed to a runner that wants to support resumption. Cheap to clone —
/// internally it's a handle over shared, lock-protected checkpoint state.
#[derive(Clone)]
pub struct ResumableContext {
    data: std::sync::Arc<Mutex<CheckpointData>>,
    last_checkpoint: std::sync::Arc<Mutex<Instant>>,
    next_progress_threshold: std::sync::Arc<AtomicU64>,
}

impl ResumableContext {
    pub fn new(job_id: String, resume_from: Option<CheckpointData>) -> Self {
        let data = resume_from.unwrap_or_else(|| CheckpointData {
            job_id,
            ..Default::default()
        });
        Self {
            data: std::sync::Arc::new(Mutex::new(data)),
            last_checkpoint: std::sync::Arc::new(Mutex::new(Instant::now())),
            next_progress_threshold: std::sync::Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark_step_complete(&self, step: impl Into<String>) {
        let mut data = self.data.lock();
        data.completed_steps.push(step.into());
    }

    pub fn was_step_completed(&self, step: &str) -> bool {
        self.data.lock().completed_steps.iter().any(|s| s == step)
    }

    pub fn set_state(&self, key: &str, value: Value) {
        let mut data = self.data.lock();
        if let Value::Object(ref mut map) = data.state {
            map.insert(key.to_string(), value);
        } else {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), value);
            data.state = Value::Object(map);
        }
    }

    pub fn set_intermediate_result(&self, key: impl Into<String>, value: Value) {
        self.data.lock().intermediate_results.insert(key.into(), value);
    }

    pub fn set_progress(&self, progress: f64) {
        self.data.lock().progress = progress.clamp(0.0, 1.0);
    }

    pub fn set_current_step(&self, step: impl Into<String>) {
        self.data.lock().current_step = Some(step.into());
    }

    pub fn progress(&self) -> f64 {
        self.data.lock().progress
    }

    pub fn snapshot(&self) -> CheckpointData {
        self.data.lock().clone()
    }

    /// §4.5: time-based (every `interval`) or progress-based (25/50/75%)
    /// checkpointing, whichever condition is met first. Returns `true` if a
    /// checkpoint should be taken now.
    pub fn checkpoint_if_needed(&self, interval: Duration) -> bool {
        let progress = self.progress();
        let next_threshold_idx = self.next_progress_threshold.load(Ordering::Relaxed) as usize;
        if let Some(&threshold) = PROGRESS_CHECKPOINTS.get(next_threshold_idx) {
            if progress >= threshold {
                self.next_progress_threshold.fetch_add(1, Ordering::Relaxed);
                *self.last_checkpoint.lock() = Instant::now();
                return true;
            }
        }
        let mut last = self.last_checkpoint.lock();
        if last.elapsed() >= interval {
            *last = Instant::now();
            return true;
        }
        false
    }
}

/// Persists [`CheckpointData`] to `{base_dir}/{job_id}.json`, one file per
/// job, mirroring the node's other per-job persisted JSON state.
pub struct CheckpointManager {
    base_dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.base_dir.join(format!("{job_id}.json"))
    }

    pub fn persist(&self, data: &CheckpointData) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.path_for(&data.job_id);
        std::fs::write(path, serde_json::to_string_pretty(data)?)?;
        Ok(())
    }

    pub fn load(&self, job_id: &str) -> Option<CheckpointData> {
        let path = self.path_for(job_id);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path).map_err(crate::error::ExecutorError::from).and_then(|s| {
            serde_json::from_str(&s).map_err(crate::error::ExecutorError::from)
        }) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(job_id, error = %e, "failed to load checkpoint, starting fresh");
                None
            }
        }
    }

    pub fn remove(&self, job_id: &str) {
        let path = self.path_for(job_id);
        std::fs::remove_file(path).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_checkpoints_fire_in_order() {
        let ctx = ResumableContext::new("j1".into(), None);
        assert!(!ctx.checkpoint_if_needed(Duration::from_secs(1000)));
        ctx.set_progress(0.3);
        assert!(ctx.checkpoint_if_needed(Duration::from_secs(1000)));
        assert!(!ctx.checkpoint_if_needed(Duration::from_secs(1000)));
        ctx.set_progress(0.6);
        assert!(ctx.checkpoint_if_needed(Duration::from_secs(1000)));
    }

    #[test]
    fn time_based_checkpoint_fires_after_interval() {
        let ctx = ResumableContext::new("j1".into(), None);
        assert!(!ctx.checkpoint_if_needed(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.checkpoint_if_needed(Duration::from_millis(1)));
    }

    #[test]
    fn mark_and_query_step_completion() {
        let ctx = ResumableContext::new("j1".into(), None);
        assert!(!ctx.was_step_completed("download"));
        ctx.mark_step_complete("download");
        assert!(ctx.was_step_completed("download"));
    }

    #[test]
    fn persist_then_reload_round_trips() {
        let dir = std::env::temp_dir().join(format!("mesh-executor-test-{}", std::process::id()));
        let manager = CheckpointManager::new(&dir);
        let ctx = ResumableContext::new("j2".into(), None);
        ctx.set_progress(0.5);
        ctx.mark_step_complete("step-1");
        let data = ctx.snapshot();
        manager.persist(&data).unwrap();
        let loaded = manager.load("j2").unwrap();
        assert_eq!(loaded.progress, 0.5);
        assert_eq!(loaded.completed_steps, vec!["step-1".to_string()]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
