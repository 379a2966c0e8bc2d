//! Job handlers, keyed by job kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{Job, QueueError};

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job kind this handler serves.
    fn kind(&self) -> &'static str;

    async fn handle(&self, job: &Job, cancel: &CancellationToken) -> Result<(), QueueError>;
}

/// Built once at startup; the worker dispatches through it.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its kind, replacing any previous one.
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub async fn dispatch(&self, job: &Job, cancel: &CancellationToken) -> Result<(), QueueError> {
        let handler = self
            .handlers
            .get(job.kind.as_str())
            .ok_or_else(|| QueueError::UnknownKind(job.kind.clone()))?;
        handler.handle(job, cancel).await
    }
}
