//! Contracts of the external collaborators the activities delegate to.
//!
//! Activities never touch storage, mail transport or the job queue
//! directly. Everything goes through these traits so the hosting system can
//! inject its own implementations (see [`crate::mock`] for in-memory ones).

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ContinuationSnapshot;
use crate::error::CollaboratorError;
use crate::model::{
    ActionId, ActionNode, Contact, ContactId, Event, MailHeader, MailTemplate, Project, ProjectId,
    TagId, TemplateId, UserId,
};

/// Job kind under which continuation requests are queued.
pub const CONTINUATION_JOB_KIND: &str = "continuation";

// ---------------------------------------------------------------------------
// ActionCatalog
// ---------------------------------------------------------------------------

/// Lookup of authored data plus the contact writes steps perform.
#[async_trait]
pub trait ActionCatalog: Send + Sync {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, CollaboratorError>;

    /// Fetch a node with its current children.
    async fn get_action(&self, id: ActionId) -> Result<Option<ActionNode>, CollaboratorError>;

    /// True iff the contact carries every tag in `include` and none in
    /// `exclude`.
    async fn has_business_tags(
        &self,
        contact_id: ContactId,
        include: &BTreeSet<TagId>,
        exclude: &BTreeSet<TagId>,
    ) -> Result<bool, CollaboratorError>;

    /// Insert when `contact.id` is `None`, replace otherwise. Returns the
    /// stored record.
    async fn upsert_contact(&self, contact: &Contact) -> Result<Contact, CollaboratorError>;

    async fn remove_contact(
        &self,
        project_id: ProjectId,
        contact_id: ContactId,
    ) -> Result<(), CollaboratorError>;

    async fn set_contact_tags(
        &self,
        contact_id: ContactId,
        include: &[TagId],
        exclude: &[TagId],
    ) -> Result<Contact, CollaboratorError>;

    async fn get_mail_template(
        &self,
        id: TemplateId,
    ) -> Result<Option<MailTemplate>, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Outcome of a write the collaborator validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn invalid(errors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { errors: errors.into_iter().map(Into::into).collect() }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Durable event recording. A successful `create` applies the owner's
/// automation rules to the new event exactly once.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn create(
        &self,
        event: Event,
        recipients: &[UserId],
    ) -> Result<ValidationResult, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// JobScheduler
// ---------------------------------------------------------------------------

/// Payload of a deferred continuation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationRequest {
    pub snapshot: ContinuationSnapshot,
    /// Children of the Schedule node at enqueue time. Informational only;
    /// the continuation re-reads the live children.
    pub child_ids: Vec<ActionId>,
}

/// Durable, at-least-once delayed job queue.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn schedule_at(
        &self,
        at: DateTime<Utc>,
        request: ContinuationRequest,
    ) -> Result<Uuid, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// MailSender
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(
        &self,
        project: &Project,
        header: &MailHeader,
        template: &MailTemplate,
    ) -> Result<(), CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Clock / IdGenerator
// ---------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of anonymous visitor ids.
pub trait IdGenerator: Send + Sync {
    fn anonymous_id(&self) -> Uuid;
}

pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn anonymous_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Everything the built-in activities need, injected once at startup.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn ActionCatalog>,
    pub events: Arc<dyn EventLog>,
    pub scheduler: Arc<dyn JobScheduler>,
    pub mail: Arc<dyn MailSender>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    /// Lifetime of tickets issued by Authenticate.
    pub ticket_lifetime: chrono::Duration,
}
