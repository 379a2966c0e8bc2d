use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::StepConfig;
use crate::traits::ensure_not_cancelled;
use crate::{
    Activity, ActivityError, ActivityResult, AuthTicket, Clock, ExecutionContext, IdGenerator,
};

/// Issues a fresh auth ticket bound to the run's contact.
///
/// When the previous ticket is missing or belonged to a different contact,
/// the visitor also gets a new anonymous id so the two identities are not
/// linked.
pub struct AuthenticateActivity {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    lifetime: Duration,
}

impl AuthenticateActivity {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>, lifetime: Duration) -> Self {
        Self { clock, ids, lifetime }
    }
}

#[async_trait]
impl Activity for AuthenticateActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        let Some(contact_id) = ctx.contact_id() else {
            return Ok(ActivityResult::forbidden());
        };
        if ctx.contact_deleted() {
            return Ok(ActivityResult::failed());
        }

        let lifetime = match ctx.current_action.config() {
            Ok(StepConfig::Authenticate(config)) => config
                .lifetime_seconds
                .map(|s| Duration::seconds(i64::from(s)))
                .unwrap_or(self.lifetime),
            Ok(_) => self.lifetime,
            Err(e) => return Ok(ActivityResult::failed_with(e.to_string())),
        };

        let same_contact = ctx
            .auth_ticket
            .as_ref()
            .is_some_and(|t| t.contact_id == contact_id);
        if !same_contact {
            ctx.anonymous_id = None;
        }
        let anonymous_id = *ctx.anonymous_id.get_or_insert_with(|| self.ids.anonymous_id());

        let now = self.clock.now();
        ctx.auth_ticket = Some(AuthTicket {
            contact_id,
            anonymous_id,
            issued_at: now,
            expires_at: now + lifetime,
        });
        debug!(contact_id, %anonymous_id, "auth ticket issued");

        Ok(ActivityResult::success())
    }
}
