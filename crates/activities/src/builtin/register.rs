use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::traits::ensure_not_cancelled;
use crate::{
    ActionCatalog, Activity, ActivityError, ActivityResult, ContactState, ExecutionContext,
};

/// Upserts the run's contact record into the project.
///
/// A record that already carries an id is replaced (state `Modified`); a
/// submitted record without one is inserted (state `Added`).
pub struct RegisterActivity {
    catalog: Arc<dyn ActionCatalog>,
}

impl RegisterActivity {
    pub fn new(catalog: Arc<dyn ActionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Activity for RegisterActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        if ctx.contact_deleted() {
            return Ok(ActivityResult::failed());
        }
        let Some(mut contact) = ctx.contact.clone() else {
            return Ok(ActivityResult::failed_with("no contact data to register"));
        };
        contact.project_id = ctx.project.id;

        let replacing = contact.id.is_some();
        let stored = match self.catalog.upsert_contact(&contact).await {
            Ok(stored) => stored,
            Err(e) => return super::rejected(e),
        };

        info!(contact_id = ?stored.id, replacing, "contact registered");
        ctx.contact = Some(stored);
        ctx.contact_state = if replacing { ContactState::Modified } else { ContactState::Added };
        Ok(ActivityResult::success())
    }
}
