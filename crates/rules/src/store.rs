//! Storage seams of the rule engine and their in-memory implementations.

use std::sync::{Mutex, MutexGuard, PoisonError};

use activities::{CategoryId, CollaboratorError, Event, EventId};
use async_trait::async_trait;

use crate::model::AutomationRule;

/// Read access to authored rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn rules_for_owner(&self, owner_id: &str) -> Result<Vec<AutomationRule>, CollaboratorError>;
}

/// Persistence of logged events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store a new event and return it with its id assigned.
    async fn insert(&self, event: Event) -> Result<Event, CollaboratorError>;

    async fn get(&self, id: EventId) -> Result<Option<Event>, CollaboratorError>;

    /// Mark the event deleted. Removing a removed event is a no-op.
    async fn remove(&self, id: EventId) -> Result<(), CollaboratorError>;

    async fn set_category(&self, id: EventId, category_id: CategoryId) -> Result<(), CollaboratorError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: Mutex<Vec<AutomationRule>>,
}

impl InMemoryRuleStore {
    pub fn new(rules: impl IntoIterator<Item = AutomationRule>) -> Self {
        Self { rules: Mutex::new(rules.into_iter().collect()) }
    }

    pub fn add(&self, rule: AutomationRule) {
        lock(&self.rules).push(rule);
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn rules_for_owner(&self, owner_id: &str) -> Result<Vec<AutomationRule>, CollaboratorError> {
        Ok(lock(&self.rules).iter().filter(|r| r.owner_id == owner_id).cloned().collect())
    }
}

/// Events kept in insertion order. Ids start at 1.
///
/// An event with a correlation uri gets the most recent earlier event with
/// the same uri as its parent.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored event, removed ones included.
    pub fn all(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    pub fn live(&self) -> Vec<Event> {
        lock(&self.events).iter().filter(|e| !e.deleted).cloned().collect()
    }
}

fn event_not_found(id: EventId) -> CollaboratorError {
    CollaboratorError::NotFound { entity: "event", id: id.to_string() }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, mut event: Event) -> Result<Event, CollaboratorError> {
        let mut events = lock(&self.events);
        event.id = Some(events.len() as EventId + 1);
        if let Some(uri) = event.correlation_uri.as_deref() {
            event.parent_id = events
                .iter()
                .rev()
                .find(|e| e.correlation_uri.as_deref() == Some(uri))
                .and_then(|e| e.id);
        }
        events.push(event.clone());
        Ok(event)
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>, CollaboratorError> {
        Ok(lock(&self.events).iter().find(|e| e.id == Some(id)).cloned())
    }

    async fn remove(&self, id: EventId) -> Result<(), CollaboratorError> {
        let mut events = lock(&self.events);
        let event = events.iter_mut().find(|e| e.id == Some(id)).ok_or_else(|| event_not_found(id))?;
        event.deleted = true;
        Ok(())
    }

    async fn set_category(&self, id: EventId, category_id: CategoryId) -> Result<(), CollaboratorError> {
        let mut events = lock(&self.events);
        let event = events.iter_mut().find(|e| e.id == Some(id)).ok_or_else(|| event_not_found(id))?;
        event.category_id = Some(category_id);
        Ok(())
    }
}
