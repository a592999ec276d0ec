//! Job execution, checkpointing, and backup takeover (§4.5).
//!
//! [`ExecutionHarness`] schedules at most `max_concurrent_jobs` runner
//! invocations, emits heartbeats, and enforces deadlines; [`CheckpointManager`]
//! persists [`ResumableContext`] snapshots a runner opts into; and
//! [`RecoveryManager`] takes over a job for a missing primary.

pub mod checkpoint;
pub mod error;
pub mod harness;
pub mod recovery;
pub mod runner;

pub use checkpoint::{CheckpointData, CheckpointManager, ResumableContext, DEFAULT_CHECKPOINT_INTERVAL};
pub use error::{ExecutorError, Result};
pub use harness::{ExecutionHarness, JobResult, JobStatus, DEFAULT_MIN_TIMEOUT, HEARTBEAT_INTERVAL};
pub use recovery::{RecoveryManager, DEFAULT_HEARTBEAT_TIMEOUT};
pub use runner::{JobRunner, ShellRunner};
