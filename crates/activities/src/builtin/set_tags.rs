use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::StepConfig;
use crate::traits::ensure_not_cancelled;
use crate::{
    ActionCatalog, Activity, ActivityError, ActivityResult, ContactState, ExecutionContext,
};

/// Adds the `include` tags to the contact and strips the `exclude` tags.
pub struct SetTagsActivity {
    catalog: Arc<dyn ActionCatalog>,
}

impl SetTagsActivity {
    pub fn new(catalog: Arc<dyn ActionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Activity for SetTagsActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        let contact_id = match ctx.contact_id() {
            Some(id) if !ctx.contact_deleted() => id,
            _ => return Ok(ActivityResult::failed()),
        };
        let config = match ctx.current_action.config() {
            Ok(StepConfig::SetTags(config)) => config,
            Ok(_) => return Ok(ActivityResult::failed()),
            Err(e) => return Ok(ActivityResult::failed_with(e.to_string())),
        };

        let updated = match self
            .catalog
            .set_contact_tags(contact_id, &config.include, &config.exclude)
            .await
        {
            Ok(contact) => contact,
            Err(e) => return super::rejected(e),
        };

        debug!(contact_id, include = ?config.include, exclude = ?config.exclude, "tags applied");
        ctx.contact = Some(updated);
        ctx.contact_state = ContactState::Modified;
        Ok(ActivityResult::success())
    }
}
