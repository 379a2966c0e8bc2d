//! The per-run execution context and its durable projection.
//!
//! Exactly one `ExecutionContext` exists per run. The executor hands it to
//! every activity as `&mut`, in traversal order, so whatever one step writes
//! (a new auth ticket, a freshly registered contact) is what every later step
//! reads. It is never cloned per branch and never shared between runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{ConfigError, StepConfig};
use crate::model::{
    ActionId, ActionNode, ActionType, AuthTicket, Contact, ContactId, ContactState, Event,
    Project, ProjectId,
};

/// Shallow view of the node currently being executed.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentAction {
    pub id: ActionId,
    pub action_type: ActionType,
    pub name: String,
    pub options: Value,
    pub child_ids: Vec<ActionId>,
}

impl CurrentAction {
    pub fn of(node: &ActionNode) -> Self {
        Self {
            id: node.id,
            action_type: node.action_type,
            name: node.name.clone(),
            options: node.options.clone(),
            child_ids: node.children.iter().map(|c| c.id).collect(),
        }
    }

    /// Placeholder for a run whose anchor has not been visited yet.
    fn anchor(id: ActionId) -> Self {
        Self {
            id,
            action_type: ActionType::Sequence,
            name: String::new(),
            options: Value::Null,
            child_ids: Vec::new(),
        }
    }

    pub fn config(&self) -> Result<StepConfig, ConfigError> {
        StepConfig::parse(self.action_type, &self.options)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub project: Project,
    pub root_action: ActionId,
    /// Set by the executor before each activity runs.
    pub current_action: CurrentAction,
    pub auth_ticket: Option<AuthTicket>,
    pub anonymous_id: Option<Uuid>,
    pub contact: Option<Contact>,
    pub contact_state: ContactState,
    /// Free-form data exchanged between steps (e.g. an invitation).
    pub properties: BTreeMap<String, Value>,
    /// Template for the events this run logs.
    pub event: Event,
}

impl ExecutionContext {
    pub fn new(project: Project, root_action: ActionId) -> Self {
        Self {
            project,
            root_action,
            current_action: CurrentAction::anchor(root_action),
            auth_ticket: None,
            anonymous_id: None,
            contact: None,
            contact_state: ContactState::Unchanged,
            properties: BTreeMap::new(),
            event: Event::default(),
        }
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    /// Id of the contact if a persisted contact is attached to the run.
    pub fn contact_id(&self) -> Option<ContactId> {
        self.contact.as_ref().and_then(|c| c.id)
    }

    /// A contact exists once it has been persisted; submitted data without an
    /// id does not count.
    pub fn contact_exists(&self) -> bool {
        self.contact_id().is_some()
    }

    pub fn contact_deleted(&self) -> bool {
        self.contact_state == ContactState::Deleted
    }

    /// `contact_exists() && !contact_deleted()`, the precondition most
    /// contact-bound steps share.
    pub fn has_live_contact(&self) -> bool {
        self.contact_exists() && !self.contact_deleted()
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.auth_ticket, self.contact_id()) {
            (Some(ticket), Some(contact_id)) => ticket.is_valid_for(contact_id, now),
            _ => false,
        }
    }

    pub fn property<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.properties.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("property '{}' does not have the expected shape: {}", key, e);
                None
            }
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Serialize) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.properties.insert(key.into(), v);
            }
            Err(e) => tracing::warn!("dropping unserializable property: {}", e),
        }
    }

    /// Capture what a deferred continuation anchored at `action_id` needs.
    pub fn snapshot(&self, action_id: ActionId) -> ContinuationSnapshot {
        ContinuationSnapshot {
            project_id: self.project.id,
            action_id,
            auth_ticket: self.auth_ticket.clone(),
            anonymous_id: self.anonymous_id,
            contact: self.contact.clone(),
            contact_state: self.contact_state,
            properties: self.properties.clone(),
            event: self.event.clone(),
        }
    }

    /// Rebuild a context from a snapshot against the current project. The
    /// continuation run is rooted at the snapshot's action.
    pub fn from_snapshot(snapshot: ContinuationSnapshot, project: Project) -> Self {
        Self {
            project,
            root_action: snapshot.action_id,
            current_action: CurrentAction::anchor(snapshot.action_id),
            auth_ticket: snapshot.auth_ticket,
            anonymous_id: snapshot.anonymous_id,
            contact: snapshot.contact,
            contact_state: snapshot.contact_state,
            properties: snapshot.properties,
            event: snapshot.event,
        }
    }
}

/// Serializable projection of an [`ExecutionContext`] used to resume a
/// scheduled subtree. The tree itself is not captured; it is re-fetched when
/// the continuation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationSnapshot {
    pub project_id: ProjectId,
    pub action_id: ActionId,
    pub auth_ticket: Option<AuthTicket>,
    pub anonymous_id: Option<Uuid>,
    pub contact: Option<Contact>,
    pub contact_state: ContactState,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub event: Event,
}
