//! Test doubles for `Activity` and for every collaborator trait.
//!
//! Useful in unit and integration tests across the workspace where the real
//! storage, mail transport or job queue is unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::memory::InMemoryCatalog;
use crate::traits::ensure_not_cancelled;
use crate::{
    ActionId, Activity, ActivityError, ActivityResult, Clock, CollaboratorError,
    ContinuationRequest, Contact, Event, EventLog, ExecutionContext, IdGenerator, JobScheduler,
    MailHeader, MailSender, MailTemplate, Project, ProjectId, Services, TemplateId, UserId,
    ValidationResult,
};

// ---------------------------------------------------------------------------
// MockActivity
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockActivity` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    Succeed,
    Fail,
    Forbid,
    Redirect(String),
    Suspend,
    /// Fail with a collaborator error instead of a result.
    Error(CollaboratorError),
    /// Trigger the token, then report success.
    CancelRun(CancellationToken),
}

/// A mock activity that records the id of every node it runs for and
/// returns a programmer-specified result.
pub struct MockActivity {
    /// Label used in test assertions.
    pub name: String,
    /// Default behaviour for every node.
    pub behaviour: MockBehaviour,
    /// Per-node overrides of `behaviour`.
    pub overrides: HashMap<ActionId, MockBehaviour>,
    /// Node ids seen (in call order). May be shared between mocks to
    /// observe the global visiting order.
    pub calls: Arc<Mutex<Vec<ActionId>>>,
}

impl MockActivity {
    pub fn new(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            overrides: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds.
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::new(name, MockBehaviour::Succeed)
    }

    /// Override the behaviour for one node.
    pub fn on(mut self, id: ActionId, behaviour: MockBehaviour) -> Self {
        self.overrides.insert(id, behaviour);
        self
    }

    /// Record calls into an existing journal.
    pub fn sharing(mut self, calls: Arc<Mutex<Vec<ActionId>>>) -> Self {
        self.calls = calls;
        self
    }

    /// Number of times this activity has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Activity for MockActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;
        let id = ctx.current_action.id;
        self.calls.lock().unwrap().push(id);

        let behaviour = self.overrides.get(&id).unwrap_or(&self.behaviour);
        match behaviour {
            MockBehaviour::Succeed => Ok(ActivityResult::success()),
            MockBehaviour::Fail => Ok(ActivityResult::failed()),
            MockBehaviour::Forbid => Ok(ActivityResult::forbidden()),
            MockBehaviour::Redirect(url) => Ok(ActivityResult::redirect(url.clone())),
            MockBehaviour::Suspend => Ok(ActivityResult::suspended()),
            MockBehaviour::Error(e) => Err(ActivityError::Collaborator(e.clone())),
            MockBehaviour::CancelRun(token) => {
                token.cancel();
                Ok(ActivityResult::success())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

/// Event log that keeps every accepted event in memory.
#[derive(Default)]
pub struct RecordingEventLog {
    events: Mutex<Vec<Event>>,
    recipients: Mutex<Vec<Vec<UserId>>>,
    reject: Mutex<Option<String>>,
    last_id: AtomicI64,
}

impl RecordingEventLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Recipient lists passed to each accepted `create`.
    pub fn recipients(&self) -> Vec<Vec<UserId>> {
        self.recipients.lock().unwrap().clone()
    }

    /// Make every following `create` fail validation with `message`.
    pub fn reject_with(&self, message: impl Into<String>) {
        *self.reject.lock().unwrap() = Some(message.into());
    }
}

#[async_trait]
impl EventLog for RecordingEventLog {
    async fn create(
        &self,
        mut event: Event,
        recipients: &[UserId],
    ) -> Result<ValidationResult, CollaboratorError> {
        if let Some(message) = self.reject.lock().unwrap().clone() {
            return Ok(ValidationResult::invalid([message]));
        }
        event.id = Some(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.events.lock().unwrap().push(event);
        self.recipients.lock().unwrap().push(recipients.to_vec());
        Ok(ValidationResult::ok())
    }
}

/// Scheduler that records requests instead of running them.
#[derive(Default)]
pub struct RecordingScheduler {
    jobs: Mutex<Vec<(DateTime<Utc>, ContinuationRequest)>>,
    fail_next: AtomicBool,
}

impl RecordingScheduler {
    pub fn jobs(&self) -> Vec<(DateTime<Utc>, ContinuationRequest)> {
        self.jobs.lock().unwrap().clone()
    }

    /// Make the next `schedule_at` fail with a backend error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn schedule_at(
        &self,
        at: DateTime<Utc>,
        request: ContinuationRequest,
    ) -> Result<Uuid, CollaboratorError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CollaboratorError::Backend("queue unavailable".into()));
        }
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push((at, request));
        Ok(Uuid::from_u128(jobs.len() as u128))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub project_id: ProjectId,
    pub header: MailHeader,
    pub template_id: TemplateId,
}

#[derive(Default)]
pub struct RecordingMailSender {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailSender {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(
        &self,
        project: &Project,
        header: &MailHeader,
        template: &MailTemplate,
    ) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push(SentMail {
            project_id: project.id,
            header: header.clone(),
            template_id: template.id,
        });
        Ok(())
    }
}

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        FixedClock::now(self)
    }
}

/// Deterministic anonymous ids: 1, 2, 3, ...
#[derive(Default)]
pub struct SequentialIds {
    last: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn anonymous_id(&self) -> Uuid {
        Uuid::from_u128(u128::from(self.last.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

// ---------------------------------------------------------------------------
// MockServices / fixtures
// ---------------------------------------------------------------------------

/// Every collaborator double, with typed handles for assertions.
pub struct MockServices {
    pub catalog: Arc<InMemoryCatalog>,
    pub events: Arc<RecordingEventLog>,
    pub scheduler: Arc<RecordingScheduler>,
    pub mail: Arc<RecordingMailSender>,
    pub clock: Arc<FixedClock>,
    pub ids: Arc<SequentialIds>,
}

impl MockServices {
    /// Doubles with [`sample_project`] already in the catalog.
    pub fn new() -> Self {
        let catalog = InMemoryCatalog::new();
        catalog.add_project(sample_project());
        Self {
            catalog: Arc::new(catalog),
            events: Arc::new(RecordingEventLog::default()),
            scheduler: Arc::new(RecordingScheduler::default()),
            mail: Arc::new(RecordingMailSender::default()),
            clock: Arc::new(FixedClock::default()),
            ids: Arc::new(SequentialIds::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            catalog: self.catalog.clone(),
            events: self.events.clone(),
            scheduler: self.scheduler.clone(),
            mail: self.mail.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
            ticket_lifetime: Duration::days(30),
        }
    }
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}

pub fn sample_project() -> Project {
    Project {
        id: 1,
        name: "Spring launch".into(),
        owner_id: Some("owner-1".into()),
        members: vec!["analyst-1".into()],
        base_url: None,
    }
}

/// Unregistered contact data for [`sample_project`].
pub fn sample_contact() -> Contact {
    Contact {
        name: Some("Lead".into()),
        ..Contact::new(1, "lead@example.com")
    }
}

pub fn sample_template(id: TemplateId) -> MailTemplate {
    MailTemplate {
        id,
        project_id: 1,
        subject: "Welcome".into(),
        body: "Hello {contact.name}".into(),
    }
}
