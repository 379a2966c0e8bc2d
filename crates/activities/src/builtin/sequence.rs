use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::traits::ensure_not_cancelled;
use crate::{Activity, ActivityError, ActivityResult, ExecutionContext};

/// Pure container: always succeeds so the executor descends into children.
pub struct SequenceActivity;

#[async_trait]
impl Activity for SequenceActivity {
    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;
        Ok(ActivityResult::success())
    }
}
