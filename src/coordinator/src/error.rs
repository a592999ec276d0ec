//! Error types for coordinator election and the fairness tracker.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The healthy-peer set was empty at election time — should not happen
    /// in practice since `healthy_node_ids` always includes self, but a
    /// caller passing a hand-built peer set could hit this.
    #[error("no healthy peers available to elect a coordinator for job {0}")]
    EmptyCandidateSet(String),
}
