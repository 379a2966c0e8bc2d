//! The `Activity` trait: the contract every step type must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::ActivityError;

/// Status reported to whoever started the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityStatus {
    Success,
    Failed,
    Forbidden,
}

/// What the executor does with the node's children.
///
/// `Stop` and `Suspend` prune identically; they only differ in intent
/// (unmet precondition vs. subtree handed to a durable continuation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    Continue,
    Stop,
    Suspend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResult {
    pub status: ActivityStatus,
    pub return_url: Option<String>,
    /// Diagnostic detail, e.g. the validation messages of a rejected write.
    pub detail: Option<String>,
    pub flow: Flow,
}

impl ActivityResult {
    pub fn success() -> Self {
        Self { status: ActivityStatus::Success, return_url: None, detail: None, flow: Flow::Continue }
    }

    pub fn redirect(url: impl Into<String>) -> Self {
        Self { return_url: Some(url.into()), ..Self::success() }
    }

    pub fn failed() -> Self {
        Self { status: ActivityStatus::Failed, return_url: None, detail: None, flow: Flow::Stop }
    }

    pub fn failed_with(detail: impl Into<String>) -> Self {
        Self { detail: Some(detail.into()), ..Self::failed() }
    }

    pub fn forbidden() -> Self {
        Self { status: ActivityStatus::Forbidden, return_url: None, detail: None, flow: Flow::Stop }
    }

    /// Reported as Failed so the caller sees the branch did not complete,
    /// while the executor knows the subtree was deferred.
    pub fn suspended() -> Self {
        Self { flow: Flow::Suspend, ..Self::failed() }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActivityStatus::Success
    }

    pub fn descends(&self) -> bool {
        self.flow == Flow::Continue
    }
}

/// The core step trait.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Run the step against the shared context.
    ///
    /// Implementations must return [`ActivityError::Cancelled`] without doing
    /// anything when `cancel` is already triggered.
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError>;
}

/// Guard shared by every activity.
pub fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), ActivityError> {
    if cancel.is_cancelled() {
        Err(ActivityError::Cancelled)
    } else {
        Ok(())
    }
}
