//! Resumes a subtree that a Schedule step deferred.
//!
//! The snapshot carries only context. The Schedule node and its children are
//! re-read from the catalog at resume time, so edits made to the tree in the
//! meantime take effect.

use std::sync::Arc;

use activities::{
    ActionCatalog, ActionId, ActionType, ContinuationRequest, ContinuationSnapshot,
    ExecutionContext, CONTINUATION_JOB_KIND,
};
use async_trait::async_trait;
use queue::{Job, JobHandler, QueueError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{EngineError, TreeExecutor};

pub struct ContinuationJob {
    catalog: Arc<dyn ActionCatalog>,
    executor: Arc<TreeExecutor>,
}

impl ContinuationJob {
    pub fn new(catalog: Arc<dyn ActionCatalog>, executor: Arc<TreeExecutor>) -> Self {
        Self { catalog, executor }
    }

    /// Run the current children of `schedule_action_id` as a sequence with
    /// the snapshot's context.
    ///
    /// A project or node that no longer exists, a disabled node, or a node
    /// without children ends the continuation without effect.
    ///
    /// # Errors
    /// Catalog faults and cancellation. The subtree's own step failures are
    /// not errors.
    #[instrument(skip(self, snapshot, cancel), fields(project_id = snapshot.project_id))]
    pub async fn resume_schedule(
        &self,
        snapshot: ContinuationSnapshot,
        schedule_action_id: ActionId,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let Some(project) = self.catalog.get_project(snapshot.project_id).await? else {
            info!("project no longer exists, continuation skipped");
            return Ok(());
        };
        let Some(action) = self.catalog.get_action(schedule_action_id).await? else {
            info!("schedule action no longer exists, continuation skipped");
            return Ok(());
        };
        if !action.enabled || action.children.is_empty() {
            info!(enabled = action.enabled, "nothing to resume");
            return Ok(());
        }

        let container = activities::ActionNode { action_type: ActionType::Sequence, ..action };
        let mut ctx = ExecutionContext::from_snapshot(snapshot, project);
        let result = self.executor.run_tree(&container, &mut ctx, cancel).await?;

        info!(status = ?result.status, "continuation finished");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ContinuationJob {
    fn kind(&self) -> &'static str {
        CONTINUATION_JOB_KIND
    }

    async fn handle(&self, job: &Job, cancel: &CancellationToken) -> Result<(), QueueError> {
        let request: ContinuationRequest = serde_json::from_value(job.payload.clone())?;
        let action_id = request.snapshot.action_id;
        self.resume_schedule(request.snapshot, action_id, cancel)
            .await
            .map_err(|e| QueueError::Handler { kind: job.kind.clone(), message: e.to_string() })
    }
}
