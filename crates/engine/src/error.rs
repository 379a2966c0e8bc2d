//! Engine-level error types.

use activities::{ActionId, CollaboratorError, ConfigError, ProjectId};
use thiserror::Error;

/// Errors produced by the engine (tree validation + execution).
///
/// Step failures are not errors: they come back as a Failed
/// [`ActivityResult`](activities::ActivityResult) and prune their branch.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more nodes share the same id.
    #[error("duplicate action id {0}")]
    DuplicateActionId(ActionId),

    /// A child's `parent_id` does not point at the node that contains it.
    #[error("action {action_id} has parent {found:?}, expected {expected}")]
    BrokenParentLink {
        action_id: ActionId,
        expected: ActionId,
        found: Option<ActionId>,
    },

    /// A node belongs to a different project than the tree's root.
    #[error("action {action_id} belongs to project {project_id}, tree belongs to {expected}")]
    ForeignProject {
        action_id: ActionId,
        project_id: ProjectId,
        expected: ProjectId,
    },

    #[error("action {action_id}: {source}")]
    InvalidConfig {
        action_id: ActionId,
        #[source]
        source: ConfigError,
    },

    #[error("tree is deeper than {max_depth} levels at action {action_id}")]
    TooDeep { action_id: ActionId, max_depth: usize },

    // ------ Execution errors ------

    /// The run was cancelled; effects of steps already run are kept.
    #[error("execution cancelled")]
    Cancelled,

    /// A continuation payload could not be decoded.
    #[error("invalid continuation snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The catalog failed while a continuation re-read the live tree.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}
