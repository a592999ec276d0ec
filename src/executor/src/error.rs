//! Error types for the execution harness (§4.5).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecutorError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no runner registered for job type {0}")]
    NoRunner(String),

    #[error("job {0} is already executing")]
    AlreadyExecuting(String),

    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
