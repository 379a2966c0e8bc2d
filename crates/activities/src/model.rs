//! Core domain models shared by every activity, the rule engine and the
//! executor.
//!
//! An action tree is authored elsewhere and handed to us read-only; these
//! types are the in-memory shape of that tree and of the records the steps
//! read and write through the collaborators.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigError, StepConfig};

pub type ActionId = i64;
pub type ProjectId = i64;
pub type ContactId = i64;
pub type TagId = i64;
pub type TemplateId = i64;
pub type EventId = i64;
pub type CategoryId = i64;
pub type UserId = String;

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

/// The closed set of step types an action node can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionType {
    Sequence,
    /// Generic pass-through control-flow step.
    Control,
    Condition,
    Authenticate,
    Register,
    Unregister,
    SetTags,
    SendMail,
    Redirect,
    Schedule,
    Log,
}

impl ActionType {
    pub const ALL: [ActionType; 11] = [
        ActionType::Sequence,
        ActionType::Control,
        ActionType::Condition,
        ActionType::Authenticate,
        ActionType::Register,
        ActionType::Unregister,
        ActionType::SetTags,
        ActionType::SendMail,
        ActionType::Redirect,
        ActionType::Schedule,
        ActionType::Log,
    ];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// ActionNode
// ---------------------------------------------------------------------------

/// One step of an action tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionNode {
    pub id: ActionId,
    pub parent_id: Option<ActionId>,
    pub project_id: ProjectId,
    pub action_type: ActionType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub modified_at: DateTime<Utc>,
    pub name: String,
    /// Opaque per-type configuration; only the matching activity reads it.
    #[serde(default)]
    pub options: serde_json::Value,
    #[serde(default)]
    pub children: Vec<ActionNode>,
}

fn default_enabled() -> bool {
    true
}

impl ActionNode {
    /// Convenience constructor, mostly for tests and fixtures.
    pub fn new(
        id: ActionId,
        project_id: ProjectId,
        action_type: ActionType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id: None,
            project_id,
            action_type,
            enabled: true,
            modified_at: Utc::now(),
            name: name.into(),
            options: serde_json::Value::Null,
            children: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    /// Append children, fixing up their parent links.
    pub fn with_children(mut self, children: impl IntoIterator<Item = ActionNode>) -> Self {
        for mut child in children {
            child.parent_id = Some(self.id);
            self.children.push(child);
        }
        self
    }

    /// Parse the opaque options into the typed configuration of this node's
    /// step type.
    pub fn config(&self) -> Result<StepConfig, ConfigError> {
        StepConfig::parse(self.action_type, &self.options)
    }

    /// Depth-first search for a node by id, including `self`.
    pub fn find(&self, id: ActionId) -> Option<&ActionNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

// ---------------------------------------------------------------------------
// Project / Contact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// The user who owns the project and its automation rules.
    pub owner_id: Option<UserId>,
    #[serde(default)]
    pub members: Vec<UserId>,
    /// Absolute base used to resolve relative redirect targets.
    pub base_url: Option<String>,
}

impl Project {
    /// Users who receive events logged in this project: the owner first,
    /// then members, without duplicates.
    pub fn recipients(&self) -> Vec<UserId> {
        let mut out: Vec<UserId> = Vec::new();
        for user in self.owner_id.iter().chain(self.members.iter()) {
            if !out.contains(user) {
                out.push(user.clone());
            }
        }
        out
    }
}

/// Lifecycle marker of the run's contact relative to the start of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactState {
    #[default]
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ContactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ContactState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unchanged" => Ok(Self::Unchanged),
            "added"     => Ok(Self::Added),
            "modified"  => Ok(Self::Modified),
            "deleted"   => Ok(Self::Deleted),
            other       => Err(format!("unknown contact state: {other}")),
        }
    }
}

/// A visitor or lead. `id` is `None` for submitted data that has not been
/// registered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Option<ContactId>,
    pub project_id: ProjectId,
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<TagId>,
}

impl Contact {
    pub fn new(project_id: ProjectId, email: impl Into<String>) -> Self {
        Self {
            id: None,
            project_id,
            email: email.into(),
            name: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = TagId>) -> Self {
        self.tags.extend(tags);
        self
    }
}

// ---------------------------------------------------------------------------
// AuthTicket
// ---------------------------------------------------------------------------

/// Proof that the visitor identified as a given contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTicket {
    pub contact_id: ContactId,
    pub anonymous_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthTicket {
    pub fn is_valid_for(&self, contact_id: ContactId, now: DateTime<Utc>) -> bool {
        self.contact_id == contact_id && now < self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A logged funnel event.
///
/// Append-only once created, except `category_id` and `deleted` (rule
/// actions) and `parent_id` (correlation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Assigned by the event store on create.
    pub id: Option<EventId>,
    pub owner_id: Option<UserId>,
    pub project_id: Option<ProjectId>,
    pub action_id: Option<ActionId>,
    pub contact_id: Option<ContactId>,
    pub contact_mail: Option<String>,
    pub contact_state: ContactState,
    pub client_id: Option<String>,
    pub correlation_uri: Option<String>,
    pub referrer_url: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub parent_id: Option<EventId>,
    #[serde(default)]
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailTemplate {
    pub id: TemplateId,
    pub project_id: ProjectId,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAddress {
    pub email: String,
    pub name: Option<String>,
}

/// Envelope and merge fields for one outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailHeader {
    pub to: MailAddress,
    pub from: Option<MailAddress>,
    pub reply_to: Option<MailAddress>,
    #[serde(default)]
    pub placeholders: std::collections::BTreeMap<String, String>,
}

/// Descriptor stored under [`INVITATION_PROPERTY`] when a contact invites
/// someone else into the funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    #[serde(default)]
    pub placeholders: std::collections::BTreeMap<String, String>,
}

pub const INVITATION_PROPERTY: &str = "Invitation";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_children_sets_parent_links() {
        let root = ActionNode::new(1, 7, ActionType::Sequence, "root").with_children([
            ActionNode::new(2, 7, ActionType::Log, "a"),
            ActionNode::new(3, 7, ActionType::Log, "b"),
        ]);
        assert!(root.children.iter().all(|c| c.parent_id == Some(1)));
        assert_eq!(root.find(3).map(|n| n.name.as_str()), Some("b"));
        assert!(root.find(9).is_none());
    }

    #[test]
    fn recipients_deduplicates_owner() {
        let project = Project {
            id: 1,
            name: "p".into(),
            owner_id: Some("alice".into()),
            members: vec!["bob".into(), "alice".into()],
            base_url: None,
        };
        assert_eq!(project.recipients(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn contact_state_parses_case_insensitively() {
        assert_eq!("deleted".parse::<ContactState>(), Ok(ContactState::Deleted));
        assert_eq!(" Added ".parse::<ContactState>(), Ok(ContactState::Added));
        assert!("gone".parse::<ContactState>().is_err());
    }

    #[test]
    fn node_deserializes_with_defaults() {
        let node: ActionNode = serde_json::from_value(serde_json::json!({
            "id": 4,
            "parentId": null,
            "projectId": 1,
            "actionType": "Log",
            "modifiedAt": "2026-01-01T00:00:00Z",
            "name": "log it"
        }))
        .expect("valid node");
        assert!(node.enabled);
        assert!(node.children.is_empty());
        assert!(node.options.is_null());
    }
}
