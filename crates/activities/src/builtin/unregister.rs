use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::traits::ensure_not_cancelled;
use crate::{
    ActionCatalog, Activity, ActivityError, ActivityResult, ContactState, ExecutionContext,
};

/// Removes the run's contact from the project.
pub struct UnregisterActivity {
    catalog: Arc<dyn ActionCatalog>,
}

impl UnregisterActivity {
    pub fn new(catalog: Arc<dyn ActionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Activity for UnregisterActivity {
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

        if let Err(e) = self.catalog.remove_contact(ctx.project.id, contact_id).await {
            return super::rejected(e);
        }

        info!(contact_id, "contact unregistered");
        ctx.contact_state = ContactState::Deleted;
        Ok(ActivityResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_contact, sample_project, MockServices};
    use crate::ActivityStatus;

    #[tokio::test]
    async fn removes_contact_and_marks_deleted() {
        let mocks = MockServices::new();
        let contact = mocks.catalog.add_contact(sample_contact());
        let mut ctx = ExecutionContext::new(sample_project(), 1).with_contact(contact);
        let activity = UnregisterActivity::new(mocks.catalog.clone());

        let result = activity.execute(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(ctx.contact_state, ContactState::Deleted);
        assert_eq!(mocks.catalog.contact_count(), 0);

        // A second unregister in the same run has nothing left to remove.
        let again = activity.execute(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(again.status, ActivityStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_contact_fails() {
        let mocks = MockServices::new();
        let mut contact = sample_contact();
        contact.id = Some(404);
        let mut ctx = ExecutionContext::new(sample_project(), 1).with_contact(contact);

        let result = UnregisterActivity::new(mocks.catalog.clone())
            .execute(&mut ctx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, ActivityStatus::Failed);
        assert_eq!(ctx.contact_state, ContactState::Unchanged);
    }
}
