//! The production `EventLog`: records an event, then runs the owner's rules
//! over it exactly once and persists what they changed.

use std::sync::Arc;

use activities::{CollaboratorError, Event, EventLog, UserId, ValidationResult};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::engine::RuleEngine;
use crate::store::EventStore;
use crate::RuleError;

pub struct RuleApplyingEventLog {
    store: Arc<dyn EventStore>,
    engine: RuleEngine,
}

impl RuleApplyingEventLog {
    pub fn new(store: Arc<dyn EventStore>, engine: RuleEngine) -> Self {
        Self { store, engine }
    }
}

fn validate(event: &Event) -> ValidationResult {
    let mut errors = Vec::new();
    if event.project_id.is_none() {
        errors.push("project is required");
    }
    if event.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        errors.push("name is required");
    }
    ValidationResult::invalid(errors)
}

fn rule_fault(err: RuleError) -> CollaboratorError {
    match err {
        RuleError::Store(e) => e,
        other => CollaboratorError::Backend(other.to_string()),
    }
}

#[async_trait]
impl EventLog for RuleApplyingEventLog {
    #[instrument(skip(self, event, recipients), fields(action_id = ?event.action_id))]
    async fn create(
        &self,
        event: Event,
        recipients: &[UserId],
    ) -> Result<ValidationResult, CollaboratorError> {
        let validation = validate(&event);
        if !validation.is_valid() {
            return Ok(validation);
        }
        // Nothing is recorded for an event its rules cannot be applied to.
        if event.owner_id.is_none() {
            warn!("event rejected: no owner to evaluate rules for");
            return Err(rule_fault(RuleError::MissingOwner { event_id: event.id }));
        }

        let mut stored = self.store.insert(event).await?;
        let Some(id) = stored.id else {
            return Err(CollaboratorError::Backend("event store assigned no id".into()));
        };
        let category_before = stored.category_id;

        let outcome = self.engine.evaluate(&mut stored).await.map_err(rule_fault)?;
        if outcome.removed {
            self.store.remove(id).await?;
        } else if let Some(category) = outcome.category_id.filter(|c| Some(*c) != category_before) {
            self.store.set_category(id, category).await?;
        }

        info!(
            event_id = id,
            parent_id = ?stored.parent_id,
            recipients = recipients.len(),
            matched = ?outcome.matched,
            removed = outcome.removed,
            "event logged"
        );
        Ok(ValidationResult::ok())
    }
}
