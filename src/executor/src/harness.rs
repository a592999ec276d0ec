//! The execution harness (§4.5): schedules at most `max_concurrent_jobs`
//! runner invocations, emits progress heartbeats every 5s, enforces each
//! job's deadline as a timeout, and delivers the settled result both to the
//! network (`JOB_RESULT`) and to an in-process result sink.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mesh_core::{now_unix, Job, MessagePayload, Timestamp};
use mesh_network::GossipNode;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::checkpoint::{CheckpointManager, ResumableContext};
use crate::error::{ExecutorError, Result};
use crate::runner::JobRunner;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failure,
    Timeout,
}

impl From<JobStatus> for mesh_core::JobStatus {
    fn from(value: JobStatus) -> Self {
        match value {
            JobStatus::Success => mesh_core::JobStatus::Success,
            JobStatus::Failure => mesh_core::JobStatus::Failure,
            JobStatus::Timeout => mesh_core::JobStatus::Timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub output: Option<Vec<u8>>,
    pub error: Option<String>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub duration: f64,
}

pub struct ExecutionHarness {
    node: Arc<GossipNode>,
    runners: DashMap<String, Arc<dyn JobRunner>>,
    checkpoints: Arc<CheckpointManager>,
    semaphore: Arc<Semaphore>,
    active: AtomicU32,
    min_timeout: Duration,
    result_tx: mpsc::Sender<JobResult>,
    /// Running job tasks, keyed by job id, so `cancel_job` (§5: "execution
    /// tasks expose `CancelJob(job_id)`") has a handle to abort.
    running: DashMap<String, tokio::task::JoinHandle<()>>,
}

impl ExecutionHarness {
    pub fn new(
        node: Arc<GossipNode>,
        checkpoints: Arc<CheckpointManager>,
        max_concurrent_jobs: u32,
    ) -> (Arc<Self>, mpsc::Receiver<JobResult>) {
        let (result_tx, result_rx) = mpsc::channel(256);
        let harness = Arc::new(Self {
            node,
            runners: DashMap::new(),
            checkpoints,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs.max(1) as usize)),
            active: AtomicU32::new(0),
            min_timeout: DEFAULT_MIN_TIMEOUT,
            result_tx,
            running: DashMap::new(),
        });
        (harness, result_rx)
    }

    pub fn register(&self, runner: Arc<dyn JobRunner>) {
        self.runners.insert(runner.job_type().to_string(), runner);
    }

    pub fn active_jobs(&self) -> u32 {
        self.active.load(Ordering::Relaxed)
    }

    /// Spawns the job's execution task. Returns immediately; the result is
    /// delivered asynchronously over the harness's result channel and
    /// broadcast as `JOB_RESULT`.
    pub fn execute(self: &Arc<Self>, job: Job) -> Result<()> {
        let runner = self
            .runners
            .get(&job.job_type)
            .map(|r| r.clone())
            .ok_or_else(|| ExecutorError::NoRunner(job.job_type.clone()))?;

        let harness = self.clone();
        let job_id = job.job_id.clone();
        let handle = tokio::spawn(async move {
            harness.run_to_completion(job, runner).await;
        });
        self.running.insert(job_id, handle);
        Ok(())
    }

    /// Aborts a running job's task outright (§5: "Execution tasks expose
    /// `CancelJob(job_id)`"). Returns `true` if a running task was found and
    /// aborted. The task's own cleanup (checkpoint removal, result
    /// broadcast) does not run for a cancelled job; callers that staked
    /// against it are responsible for unwinding that separately.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        if let Some((_, handle)) = self.running.remove(job_id) {
            handle.abort();
            self.checkpoints.remove(job_id);
            true
        } else {
            false
        }
    }

    async fn run_to_completion(self: Arc<Self>, job: Job, runner: Arc<dyn JobRunner>) {
        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            return;
        };
        self.active.fetch_add(1, Ordering::Relaxed);

        let start = now_unix();
        let resume_from = self.checkpoints.load(&job.job_id);
        let ctx = ResumableContext::new(job.job_id.clone(), resume_from);

        let timeout = Duration::from_secs_f64((job.deadline - start).max(self.min_timeout.as_secs_f64()));
        let heartbeat = self.spawn_heartbeat(job.job_id.clone(), ctx.clone());

        let outcome = tokio::time::timeout(timeout, runner.run(&job, &ctx)).await;
        heartbeat.abort();
        self.active.fetch_sub(1, Ordering::Relaxed);

        let end = now_unix();
        let (status, output, error) = match outcome {
            Ok(Ok(output)) => (JobStatus::Success, Some(output), None),
            Ok(Err(e)) => (JobStatus::Failure, None, Some(e)),
            Err(_) => {
                warn!(job_id = job.job_id, "job execution timed out");
                (JobStatus::Timeout, None, Some("execution timed out".to_string()))
            }
        };

        self.checkpoints.remove(&job.job_id);
        self.running.remove(&job.job_id);

        let result = JobResult {
            job_id: job.job_id.clone(),
            status,
            output: output.clone(),
            error: error.clone(),
            start_time: start,
            end_time: end,
            duration: end - start,
        };

        info!(job_id = result.job_id, ?status, duration = result.duration, "job finished");
        self.node.broadcast(MessagePayload::JobResult {
            job_id: result.job_id.clone(),
            status: status.into(),
            duration: result.duration,
            output,
            error,
        });
        let _ = self.result_tx.send(result).await;
    }

    fn spawn_heartbeat(self: &Arc<Self>, job_id: String, ctx: ResumableContext) -> tokio::task::JoinHandle<()> {
        let node = self.node.clone();
        let checkpoints = self.checkpoints.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                interval.tick().await;
                node.broadcast(MessagePayload::JobHeartbeat {
                    job_id: job_id.clone(),
                    progress: ctx.progress(),
                });
                if ctx.checkpoint_if_needed(crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL) {
                    if let Err(e) = checkpoints.persist(&ctx.snapshot()) {
                        warn!(job_id, error = %e, "failed to persist checkpoint");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mesh_crypto::SigningIdentity;
    use std::collections::BTreeSet;

    struct SleepRunner;

    #[async_trait]
    impl JobRunner for SleepRunner {
        fn job_type(&self) -> &str {
            "sleep"
        }

        async fn run(&self, _job: &Job, _ctx: &ResumableContext) -> std::result::Result<Vec<u8>, String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn job(job_type: &str, deadline: f64) -> Job {
        Job {
            job_id: "j1".into(),
            job_type: job_type.into(),
            priority: 0.5,
            payment: 10.0,
            deadline,
            requirements: BTreeSet::new(),
            payload: vec![],
            verify: false,
            verifiers: vec![],
            timestamp: 0.0,
        }
    }

    async fn test_harness() -> (Arc<ExecutionHarness>, mpsc::Receiver<JobResult>, tempfile::TempDir) {
        let identity = SigningIdentity::generate();
        let (gossip, _dispatch_rx) =
            GossipNode::bind("n1".into(), identity, mesh_network::GossipConfig::default())
                .await
                .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = Arc::new(CheckpointManager::new(dir.path().to_path_buf()));
        let (harness, result_rx) = ExecutionHarness::new(gossip, checkpoints, 4);
        (harness, result_rx, dir)
    }

    #[tokio::test]
    async fn cancel_job_aborts_a_running_task() {
        let (harness, _result_rx, _dir) = test_harness().await;
        harness.register(Arc::new(SleepRunner));
        harness.execute(job("sleep", now_unix() + 60.0)).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(harness.cancel_job("j1"));
        assert!(!harness.cancel_job("j1"), "second cancel finds nothing left to abort");
    }

    #[tokio::test]
    async fn cancel_job_on_unknown_job_is_a_no_op() {
        let (harness, _result_rx, _dir) = test_harness().await;
        assert!(!harness.cancel_job("does-not-exist"));
    }

    #[tokio::test]
    async fn deadline_in_the_past_times_out_at_the_minimum_timeout() {
        let (harness, mut result_rx, _dir) = test_harness().await;
        harness.register(Arc::new(SleepRunner));
        harness.execute(job("sleep", now_unix() - 10.0)).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), result_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.status, JobStatus::Timeout);
    }
}
