use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::StepConfig;
use crate::traits::ensure_not_cancelled;
use crate::{
    Activity, ActivityError, ActivityResult, Clock, ContinuationRequest, ExecutionContext,
    JobScheduler,
};

/// Defers this node's children to a durable continuation.
///
/// Never succeeds synchronously: the result is always Failed so the
/// executor does not descend. After a successful enqueue the flow is
/// `Suspend`; when nothing could be enqueued it is a plain `Stop`.
pub struct ScheduleActivity {
    scheduler: Arc<dyn JobScheduler>,
    clock: Arc<dyn Clock>,
}

impl ScheduleActivity {
    pub fn new(scheduler: Arc<dyn JobScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self { scheduler, clock }
    }
}

#[async_trait]
impl Activity for ScheduleActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        if !ctx.has_live_contact() {
            return Ok(ActivityResult::failed());
        }
        let config = match ctx.current_action.config() {
            Ok(StepConfig::Schedule(config)) => config,
            Ok(_) => return Ok(ActivityResult::failed()),
            Err(e) => return Ok(ActivityResult::failed_with(e.to_string())),
        };

        let action_id = ctx.current_action.id;
        let Some(run_at) = config.target(self.clock.now()) else {
            return Ok(ActivityResult::failed_with("schedule target is out of range"));
        };
        let request = ContinuationRequest {
            snapshot: ctx.snapshot(action_id),
            child_ids: ctx.current_action.child_ids.clone(),
        };

        match self.scheduler.schedule_at(run_at, request).await {
            Ok(job_id) => {
                info!(action_id, %job_id, %run_at, "continuation scheduled");
                Ok(ActivityResult::suspended())
            }
            Err(e) => {
                warn!(action_id, "failed to schedule continuation: {}", e);
                Ok(ActivityResult::failed_with(e.to_string()))
            }
        }
    }
}
