//! Error types for checkpoint persistence and replay planning.

use thiserror::Error;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while capturing, persisting, or loading a checkpoint.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the given execution id.
    #[error("checkpoint not found for execution {0}")]
    NotFound(String),

    /// The checkpoint failed to (de)serialize.
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store could not be read from or written to.
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    /// I/O failure while writing the tmp-then-rename file.
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by replay-plan computation. These map to the blocking
/// reasons and fatal conditions in the replay planner contract; they are
/// distinct from [`CheckpointError`] because a blocked plan is an expected,
/// user-facing outcome rather than a storage failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// `fromNodeId` does not exist in the current workflow.
    #[error("replay target node '{0}' does not exist in the current workflow")]
    InvalidNode(String),

    /// `fromNodeId` lies on a branch that the checkpoint marks inactive.
    #[error("replay target node '{0}' is on an inactive branch")]
    InactiveBranch(String),

    /// No checkpoint is available for the source execution at all.
    #[error("no checkpoint found for source execution '{0}'")]
    MissingCheckpoint(String),

    /// An ancestor of the replay target is neither complete nor skipped in
    /// the checkpoint, or is complete but missing its recorded output.
    #[error("ancestor '{ancestor}' of replay target '{target}' has no reusable state: {reason}")]
    DependencyMissing {
        ancestor: String,
        target: String,
        reason: String,
    },
}
