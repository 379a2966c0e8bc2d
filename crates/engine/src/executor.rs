//! Action-tree execution engine.
//!
//! `TreeExecutor` walks one tree depth-first, pre-order, over a single
//! mutable `ExecutionContext`:
//! 1. Runs the node's `Activity`, looked up by `ActionType`.
//! 2. Descends into the children in order only when the step succeeded.
//! 3. A Failed or Forbidden step prunes its own subtree; siblings still run.
//! 4. Reports the root node's result as the outcome of the whole run.
//!
//! Collaborator faults prune the branch like a Failed step. Cancellation
//! aborts the remaining walk; effects already performed are not rolled back.

use activities::{
    ActionNode, ActivityError, ActivityResult, CurrentAction, ExecutionContext,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, instrument, warn, Instrument};

use crate::{ActivityRegistry, EngineConfig, EngineError};

/// Stateless orchestrator; one instance serves every run of the process.
pub struct TreeExecutor {
    registry: ActivityRegistry,
    config: EngineConfig,
}

impl TreeExecutor {
    pub fn new(registry: ActivityRegistry, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the tree rooted at `root` and return the root's result.
    ///
    /// # Errors
    /// Only [`EngineError::Cancelled`]; every other problem is folded into
    /// the affected node's Failed result.
    #[instrument(skip(self, root, ctx, cancel), fields(root_action = root.id, project_id = ctx.project.id))]
    pub async fn run_tree(
        &self,
        root: &ActionNode,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, EngineError> {
        info!("run started");

        // Explicit stack: children are pushed in reverse so they pop in order.
        let mut stack: Vec<(&ActionNode, usize)> = vec![(root, 0)];
        let mut outcome: Option<ActivityResult> = None;
        let mut steps = 0usize;

        while let Some((node, depth)) = stack.pop() {
            if cancel.is_cancelled() {
                info!(steps, "run cancelled");
                return Err(EngineError::Cancelled);
            }

            let span = debug_span!("step", action_id = node.id, action_type = %node.action_type, depth);
            let result = self.run_step(node, depth, ctx, cancel).instrument(span).await?;
            steps += 1;

            if result.descends() {
                stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
            } else if !node.children.is_empty() {
                debug!(action_id = node.id, flow = ?result.flow, "subtree not entered");
            }
            if outcome.is_none() {
                outcome = Some(result);
            }
        }

        let outcome = outcome.unwrap_or_else(ActivityResult::failed);
        info!(steps, status = ?outcome.status, "run finished");
        Ok(outcome)
    }

    async fn run_step(
        &self,
        node: &ActionNode,
        depth: usize,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, EngineError> {
        if !node.enabled {
            debug!("disabled, skipped with its subtree");
            return Ok(ActivityResult::failed());
        }
        if depth > self.config.max_depth {
            warn!(max_depth = self.config.max_depth, "tree too deep, branch pruned");
            return Ok(ActivityResult::failed_with(format!(
                "maximum tree depth {} exceeded",
                self.config.max_depth
            )));
        }
        let Some(activity) = self.registry.get(node.action_type) else {
            warn!("no activity registered, branch pruned");
            return Ok(ActivityResult::failed_with(format!(
                "no activity registered for {}",
                node.action_type
            )));
        };

        ctx.current_action = CurrentAction::of(node);
        match activity.execute(ctx, cancel).await {
            Ok(result) => {
                debug!(status = ?result.status, flow = ?result.flow, "step finished");
                Ok(result)
            }
            Err(ActivityError::Cancelled) => Err(EngineError::Cancelled),
            Err(ActivityError::Collaborator(e)) => {
                error!("collaborator fault: {}", e);
                warn!("branch pruned after collaborator fault");
                Ok(ActivityResult::failed_with(e.to_string()))
            }
        }
    }
}
