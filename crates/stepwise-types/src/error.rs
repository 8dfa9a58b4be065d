use thiserror::Error;

/// Errors from builder-style edits of a workflow definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowEditError {
    #[error("step '{0}' already exists")]
    DuplicateStep(String),

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("condition step '{0}' needs a branch label (use connect_branch)")]
    BranchRequired(String),

    #[error("step '{0}' is not a condition step")]
    NotACondition(String),
}

/// Errors from repository operations (used by trait definitions in stepwise-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
