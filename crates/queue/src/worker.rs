//! Polling worker that drains due jobs from a [`JobSource`].
//!
//! Each job is delivered at least once. After a handler failure it is handed
//! back to the source, which retries it until `max_attempts` and then drops
//! it; a dropped job is logged at `warn` and never compensated. When the
//! source cannot record a job's outcome the claim is left to expire and the
//! rest of the batch is still processed.

use std::sync::Arc;

use activities::Clock;
use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{FailOutcome, HandlerRegistry, Job, JobSource, QueueError, WorkerConfig};

pub struct Worker {
    source: Arc<dyn JobSource>,
    handlers: HandlerRegistry,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

/// Counters for one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub completed: usize,
    pub retried: usize,
    pub dropped: usize,
    /// Jobs whose outcome the source failed to record.
    pub unrecorded: usize,
}

impl PollStats {
    pub fn processed(&self) -> usize {
        self.completed + self.retried + self.dropped + self.unrecorded
    }
}

impl Worker {
    pub fn new(
        source: Arc<dyn JobSource>,
        handlers: HandlerRegistry,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self { source, handlers, clock, config }
    }

    /// Poll until `cancel` fires. Source errors are logged and the loop keeps
    /// going after the usual poll interval.
    #[instrument(skip_all, fields(kinds = ?self.handlers.kinds()))]
    pub async fn run(&self, cancel: CancellationToken) {
        info!("worker started");
        while !cancel.is_cancelled() {
            let idle = match self.run_once(&cancel).await {
                Ok(stats) => stats.processed() == 0,
                Err(e) => {
                    error!("polling job source failed: {}", e);
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        info!("worker stopped");
    }

    /// Claim one batch of due jobs and process it.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<PollStats, QueueError> {
        let jobs = self.source.fetch_due(self.clock.now(), self.config.batch_size).await?;
        let mut stats = PollStats::default();
        for job in jobs {
            if cancel.is_cancelled() {
                // Unprocessed claims go back for another delivery.
                if let Err(e) = self.source.fail(job.id, "worker shutting down", self.clock.now()).await {
                    warn!(job_id = %job.id, "could not release claim, left to expire: {}", e);
                }
                continue;
            }
            match self.process(&job, cancel).await {
                Ok(None) => stats.completed += 1,
                Ok(Some(FailOutcome::Retrying { .. })) => stats.retried += 1,
                Ok(Some(FailOutcome::Dropped { .. })) => stats.dropped += 1,
                Err(e) => {
                    error!(job_id = %job.id, "recording job outcome failed, claim left to expire: {}", e);
                    stats.unrecorded += 1;
                }
            }
        }
        Ok(stats)
    }

    #[instrument(skip(self, job, cancel), fields(job_id = %job.id, kind = %job.kind, attempt = job.attempts))]
    async fn process(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<Option<FailOutcome>, QueueError> {
        let err = match self.handlers.dispatch(job, cancel).await {
            Ok(()) => {
                self.source.complete(job.id).await?;
                debug!("job completed");
                return Ok(None);
            }
            Err(e) => e,
        };

        let delay = Duration::from_std(self.config.retry_delay(job.attempts))
            .unwrap_or_else(|_| Duration::seconds(30));
        let outcome = self.source.fail(job.id, &err.to_string(), self.clock.now() + delay).await?;
        match outcome {
            FailOutcome::Retrying { attempts, run_at } => {
                info!(attempts, %run_at, "job failed, retry scheduled: {}", err);
            }
            FailOutcome::Dropped { attempts } => {
                warn!(attempts, "job dropped after final attempt: {}", err);
            }
        }
        Ok(Some(outcome))
    }
}
