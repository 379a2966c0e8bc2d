//! `PgJobStore`: the `continuation_jobs` table as scheduler and job source.

use std::time::Duration;

use activities::{CollaboratorError, ContinuationRequest, JobScheduler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queue::{lease_cutoff, FailOutcome, Job, JobSource, QueueError, DEFAULT_LEASE};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::JobStatus;
use crate::repository::jobs;
use crate::{DbError, DbPool};

#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
    max_attempts: u32,
    lease: Duration,
}

impl PgJobStore {
    pub fn new(pool: DbPool, max_attempts: u32) -> Self {
        Self { pool, max_attempts, lease: DEFAULT_LEASE }
    }

    /// Override how long a claim stays exclusive. Must exceed the longest
    /// expected handler run.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

fn source_error(err: DbError) -> QueueError {
    QueueError::Source(err.to_string())
}

#[async_trait]
impl JobScheduler for PgJobStore {
    #[instrument(skip(self, request), fields(action_id = request.snapshot.action_id))]
    async fn schedule_at(
        &self,
        at: DateTime<Utc>,
        request: ContinuationRequest,
    ) -> Result<Uuid, CollaboratorError> {
        let job = Job::continuation(&request, at, self.max_attempts)
            .map_err(|e| CollaboratorError::Backend(e.to_string()))?;
        let max_attempts = i32::try_from(job.max_attempts).unwrap_or(i32::MAX);
        let row = jobs::enqueue_job(&self.pool, job.id, &job.kind, job.payload, at, max_attempts)
            .await
            .map_err(|e| CollaboratorError::Backend(e.to_string()))?;
        debug!(job_id = %row.id, "continuation persisted");
        Ok(row.id)
    }
}

#[async_trait]
impl JobSource for PgJobStore {
    async fn fetch_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, QueueError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        jobs::fetch_due_jobs(&self.pool, now, lease_cutoff(now, self.lease), limit)
            .await
            .map_err(source_error)?
            .into_iter()
            .map(|row| row.into_job().map_err(source_error))
            .collect()
    }

    async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        match jobs::complete_job(&self.pool, id).await {
            Err(DbError::NotFound) => Err(QueueError::NotInFlight(id)),
            other => other.map_err(source_error),
        }
    }

    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailOutcome, QueueError> {
        let row = match jobs::fail_job(&self.pool, id, error, retry_at).await {
            Err(DbError::NotFound) => return Err(QueueError::NotInFlight(id)),
            other => other.map_err(source_error)?,
        };
        let status = row.status().map_err(source_error)?;
        let job = row.into_job().map_err(source_error)?;
        Ok(match status {
            JobStatus::Dropped => FailOutcome::Dropped { attempts: job.attempts },
            _ => FailOutcome::Retrying { attempts: job.attempts, run_at: job.run_at },
        })
    }
}
