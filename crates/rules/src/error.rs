use activities::{CollaboratorError, EventId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    /// Rules belong to a user; an event without an owner cannot be matched.
    #[error("event {event_id:?} has no owner; rules cannot be evaluated")]
    MissingOwner { event_id: Option<EventId> },

    #[error("rule store: {0}")]
    Store(#[from] CollaboratorError),
}
