//! `activities` crate: the `Activity` trait, the execution context and the
//! built-in funnel steps.
//!
//! Every step type must implement [`Activity`]. The engine dispatches
//! execution through this trait object, and the steps reach the outside
//! world only through the collaborator traits in [`collaborators`].

pub mod builtin;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod mock;
pub mod model;
pub mod traits;

pub use builtin::builtin_activities;
pub use collaborators::{
    ActionCatalog, Clock, ContinuationRequest, EventLog, IdGenerator, JobScheduler, MailSender,
    RandomIds, Services, SystemClock, ValidationResult, CONTINUATION_JOB_KIND,
};
pub use config::StepConfig;
pub use context::{ContinuationSnapshot, CurrentAction, ExecutionContext};
pub use error::{ActivityError, CollaboratorError, ConfigError};
pub use model::{
    ActionId, ActionNode, ActionType, AuthTicket, CategoryId, Contact, ContactId, ContactState,
    Event, EventId, Invitation, MailAddress, MailHeader, MailTemplate, Project, ProjectId, TagId,
    TemplateId, UserId, INVITATION_PROPERTY,
};
pub use traits::{ensure_not_cancelled, Activity, ActivityResult, ActivityStatus, Flow};
