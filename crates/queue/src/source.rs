use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{FailOutcome, Job, QueueError};

/// How long a claim stays exclusive before the job is handed out again.
pub const DEFAULT_LEASE: StdDuration = StdDuration::from_secs(300);

/// Where the worker claims due jobs from.
///
/// A claimed job is in flight until it is completed or failed; claiming
/// counts as one delivery attempt. A claim that is neither completed nor
/// failed within the source's lease expires: the job is claimed again by the
/// next fetch, or dropped if that claim was its last attempt.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Claim up to `limit` jobs whose `run_at` is not after `now`, oldest
    /// first, including jobs whose previous claim has expired.
    async fn fetch_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, QueueError>;

    async fn complete(&self, id: Uuid) -> Result<(), QueueError>;

    /// Return the job for another delivery at `retry_at`, or drop it once it
    /// has used all its attempts.
    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailOutcome, QueueError>;
}

/// Claims made at or before the returned instant have expired. `None` when
/// the lease reaches past the representable range, so nothing expires.
pub fn lease_cutoff(now: DateTime<Utc>, lease: StdDuration) -> Option<DateTime<Utc>> {
    let lease = Duration::from_std(lease).ok()?;
    now.checked_sub_signed(lease)
}
