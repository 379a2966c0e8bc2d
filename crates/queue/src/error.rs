//! Queue-level error types.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    /// No handler is registered for the job's kind.
    #[error("no handler registered for job kind '{0}'")]
    UnknownKind(String),

    /// The handler ran and reported a failure; the job is retried or dropped.
    #[error("job handler '{kind}' failed: {message}")]
    Handler { kind: String, message: String },

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("job {0} is not in flight")]
    NotInFlight(Uuid),

    /// The backing store could not be reached.
    #[error("job source: {0}")]
    Source(String),
}
