//! The runner contract (§4.5): `Run(job) -> Output | Error`, plus a trivial
//! in-process shell runner used both as the default `job_type = "shell"`
//! handler and as a template for custom runners.

use async_trait::async_trait;
use mesh_core::Job;

use crate::checkpoint::ResumableContext;

#[async_trait]
pub trait JobRunner: Send + Sync {
    fn job_type(&self) -> &str;

    /// Runs `job.payload`, optionally using `ctx` to checkpoint progress.
    /// A runner that doesn't need resumption can ignore `ctx` entirely.
    async fn run(&self, job: &Job, ctx: &ResumableContext) -> Result<Vec<u8>, String>;
}

/// Executes `job.payload` (interpreted as a UTF-8 shell command line)
/// in-process via `sh -c`. Captures stdout on success; stderr plus the exit
/// status on failure.
pub struct ShellRunner;

#[async_trait]
impl JobRunner for ShellRunner {
    fn job_type(&self) -> &str {
        "shell"
    }

    async fn run(&self, job: &Job, ctx: &ResumableContext) -> Result<Vec<u8>, String> {
        let command = String::from_utf8(job.payload.clone()).map_err(|e| e.to_string())?;
        ctx.set_current_step("running");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .await
            .map_err(|e| e.to_string())?;
        ctx.mark_step_complete("running");
        ctx.set_progress(1.0);
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(format!(
                "command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn job(payload: &str) -> Job {
        Job {
            job_id: "j1".into(),
            job_type: "shell".into(),
            priority: 0.5,
            payment: 1.0,
            deadline: 1000.0,
            requirements: BTreeSet::new(),
            payload: payload.as_bytes().to_vec(),
            verify: false,
            verifiers: vec![],
            timestamp: 0.0,
        }
    }

    #[tokio::test]
    async fn shell_runner_captures_stdout() {
        let runner = ShellRunner;
        let ctx = ResumableContext::new("j1".into(), None);
        let output = runner.run(&job("echo hello"), &ctx).await.unwrap();
        assert_eq!(String::from_utf8(output).unwrap().trim(), "hello");
        assert_eq!(ctx.progress(), 1.0);
    }

    #[tokio::test]
    async fn shell_runner_reports_nonzero_exit() {
        let runner = ShellRunner;
        let ctx = ResumableContext::new("j1".into(), None);
        let result = runner.run(&job("exit 1"), &ctx).await;
        assert!(result.is_err());
    }
}
