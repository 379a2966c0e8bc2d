//! Activity-level error types.

use thiserror::Error;

use crate::model::ActionType;

/// Errors returned by an activity's `execute` method.
///
/// Unmet preconditions and rejected writes are *not* errors; they come back
/// as a Failed [`ActivityResult`](crate::ActivityResult). This type covers
/// the two cases the executor must treat differently:
/// - `Cancelled`: the run is aborted.
/// - `Collaborator`: an infrastructure fault; only this branch is pruned.
#[derive(Debug, Error, Clone)]
pub enum ActivityError {
    #[error("execution cancelled")]
    Cancelled,

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Errors reported by the external collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The collaborator rejected the write; the messages are surfaced on the
    /// Failed result.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("collaborator backend error: {0}")]
    Backend(String),
}

/// A node's options could not be turned into its typed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {action_type} configuration: {source}")]
    Malformed {
        action_type: ActionType,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {action_type} configuration: field '{field}' {message}")]
    InvalidField {
        action_type: ActionType,
        field: &'static str,
        message: String,
    },
}
