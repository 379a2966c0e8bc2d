use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::StepConfig;
use crate::traits::ensure_not_cancelled;
use crate::{Activity, ActivityError, ActivityResult, Clock, Event, EventLog, ExecutionContext};

/// Records the run's event. The event log applies automation rules to it.
pub struct LogActivity {
    events: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
}

impl LogActivity {
    pub fn new(events: Arc<dyn EventLog>, clock: Arc<dyn Clock>) -> Self {
        Self { events, clock }
    }

    fn assemble(&self, ctx: &ExecutionContext, anonymous: bool, name: Option<String>) -> Event {
        let mut event = ctx.event.clone();
        event.id = None;
        event.deleted = false;
        event.owner_id = ctx.project.owner_id.clone();
        event.project_id = Some(ctx.project.id);
        event.action_id = Some(ctx.current_action.id);
        event.contact_state = ctx.contact_state;
        event.name = name.or_else(|| Some(ctx.current_action.name.clone()));
        if event.start_date.is_none() {
            event.start_date = Some(self.clock.now());
        }
        if event.client_id.is_none() {
            event.client_id = ctx.anonymous_id.map(|id| id.to_string());
        }

        if anonymous {
            event.contact_id = None;
            event.contact_mail = None;
        } else if let Some(contact) = &ctx.contact {
            event.contact_id = contact.id;
            event.contact_mail = Some(contact.email.clone());
        }
        event
    }
}

#[async_trait]
impl Activity for LogActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        let config = match ctx.current_action.config() {
            Ok(StepConfig::Log(config)) => config,
            Ok(_) => return Ok(ActivityResult::failed()),
            Err(e) => return Ok(ActivityResult::failed_with(e.to_string())),
        };
        if !config.anonymous && !ctx.contact_exists() {
            debug!(action_id = ctx.current_action.id, "nothing to log: no contact and not anonymous");
            return Ok(ActivityResult::failed());
        }

        let event = self.assemble(ctx, config.anonymous, config.name);
        let recipients = ctx.project.recipients();
        let validation = match self.events.create(event, &recipients).await {
            Ok(v) => v,
            Err(e) => return super::rejected(e),
        };

        if !validation.is_valid() {
            return Ok(ActivityResult::failed_with(validation.errors.join("; ")));
        }
        info!(action_id = ctx.current_action.id, anonymous = config.anonymous, "event logged");
        Ok(ActivityResult::success())
    }
}
