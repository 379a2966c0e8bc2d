//! Built-in step implementations, one module per [`ActionType`].

mod authenticate;
mod condition;
mod log;
mod redirect;
mod register;
mod schedule;
mod send_mail;
mod sequence;
mod set_tags;
mod unregister;

use std::sync::Arc;

pub use authenticate::AuthenticateActivity;
pub use condition::{ConditionActivity, ConditionVerdict};
pub use log::LogActivity;
pub use redirect::{RedirectActivity, RedirectToken};
pub use register::RegisterActivity;
pub use schedule::ScheduleActivity;
pub use send_mail::SendMailActivity;
pub use sequence::SequenceActivity;
pub use set_tags::SetTagsActivity;
pub use unregister::UnregisterActivity;

use crate::{Activity, ActivityError, ActivityResult, ActionType, CollaboratorError, Services};

/// One activity per step type, wired to the given collaborators.
pub fn builtin_activities(services: &Services) -> Vec<(ActionType, Arc<dyn Activity>)> {
    let sequence: Arc<dyn Activity> = Arc::new(SequenceActivity);
    vec![
        (ActionType::Sequence, sequence.clone()),
        (ActionType::Control, sequence),
        (
            ActionType::Condition,
            Arc::new(ConditionActivity::new(services.catalog.clone(), services.clock.clone())),
        ),
        (
            ActionType::Authenticate,
            Arc::new(AuthenticateActivity::new(
                services.clock.clone(),
                services.ids.clone(),
                services.ticket_lifetime,
            )),
        ),
        (ActionType::Register, Arc::new(RegisterActivity::new(services.catalog.clone()))),
        (ActionType::Unregister, Arc::new(UnregisterActivity::new(services.catalog.clone()))),
        (ActionType::SetTags, Arc::new(SetTagsActivity::new(services.catalog.clone()))),
        (
            ActionType::SendMail,
            Arc::new(SendMailActivity::new(services.catalog.clone(), services.mail.clone())),
        ),
        (ActionType::Redirect, Arc::new(RedirectActivity::new(services.clock.clone()))),
        (
            ActionType::Schedule,
            Arc::new(ScheduleActivity::new(services.scheduler.clone(), services.clock.clone())),
        ),
        (ActionType::Log, Arc::new(LogActivity::new(services.events.clone(), services.clock.clone()))),
    ]
}

/// Map a collaborator error onto the step outcome: rejected writes and
/// missing records fail the step, backend faults go to the executor.
fn rejected(err: CollaboratorError) -> Result<ActivityResult, ActivityError> {
    match err {
        CollaboratorError::Backend(_) => Err(ActivityError::Collaborator(err)),
        other => Ok(ActivityResult::failed_with(other.to_string())),
    }
}
