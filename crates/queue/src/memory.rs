//! In-process job queue: a heap of pending jobs ordered by run time.
//!
//! Jobs do not survive a restart. Use the Postgres store for durability.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration as StdDuration;

use activities::{Clock, CollaboratorError, ContinuationRequest, JobScheduler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{lease_cutoff, FailOutcome, Job, JobSource, QueueError, DEFAULT_LEASE};

struct Pending {
    seq: u64,
    job: Job,
}

impl Pending {
    fn key(&self) -> (DateTime<Utc>, u64) {
        (self.job.run_at, self.seq)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed: `BinaryHeap` is a max-heap and we pop the earliest job first.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

struct Claim {
    job: Job,
    claimed_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    pending: BinaryHeap<Pending>,
    in_flight: HashMap<Uuid, Claim>,
    next_seq: u64,
}

impl QueueState {
    fn push(&mut self, job: Job) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Pending { seq, job });
    }

    /// Move claims made at or before `cutoff` back to pending, or drop them
    /// when the expired claim was their last attempt.
    fn reclaim_expired(&mut self, cutoff: DateTime<Utc>) {
        let expired: Vec<Uuid> = self
            .in_flight
            .iter()
            .filter(|(_, claim)| claim.claimed_at <= cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            let Some(Claim { job, .. }) = self.in_flight.remove(&id) else { continue };
            if job.exhausted() {
                warn!(job_id = %id, attempts = job.attempts, "claim expired after final attempt, job dropped");
            } else {
                debug!(job_id = %id, attempts = job.attempts, "claim expired, job released");
                self.push(job);
            }
        }
    }
}

pub struct InMemoryScheduler {
    state: Mutex<QueueState>,
    max_attempts: u32,
    lease: StdDuration,
}

impl InMemoryScheduler {
    pub fn new(max_attempts: u32) -> Self {
        Self { state: Mutex::new(QueueState::default()), max_attempts, lease: DEFAULT_LEASE }
    }

    /// Override how long a claim stays exclusive.
    pub fn with_lease(mut self, lease: StdDuration) -> Self {
        self.lease = lease;
        self
    }

    pub async fn enqueue(&self, job: Job) -> Uuid {
        let id = job.id;
        self.state.lock().await.push(job);
        id
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Earliest pending run time, if any.
    pub async fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.pending.peek().map(|p| p.job.run_at)
    }
}

#[async_trait]
impl JobScheduler for InMemoryScheduler {
    async fn schedule_at(
        &self,
        at: DateTime<Utc>,
        request: ContinuationRequest,
    ) -> Result<Uuid, CollaboratorError> {
        let job = Job::continuation(&request, at, self.max_attempts)
            .map_err(|e| CollaboratorError::Backend(e.to_string()))?;
        debug!(job_id = %job.id, run_at = %at, "continuation queued in memory");
        Ok(self.enqueue(job).await)
    }
}

#[async_trait]
impl JobSource for InMemoryScheduler {
    async fn fetch_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, QueueError> {
        let mut state = self.state.lock().await;
        if let Some(cutoff) = lease_cutoff(now, self.lease) {
            state.reclaim_expired(cutoff);
        }
        let mut due = Vec::new();
        while due.len() < limit && state.pending.peek().is_some_and(|p| p.job.run_at <= now) {
            let Some(Pending { mut job, .. }) = state.pending.pop() else { break };
            job.attempts += 1;
            state.in_flight.insert(job.id, Claim { job: job.clone(), claimed_at: now });
            due.push(job);
        }
        Ok(due)
    }

    async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&id).map(|_| ()).ok_or(QueueError::NotInFlight(id))
    }

    async fn fail(
        &self,
        id: Uuid,
        _error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailOutcome, QueueError> {
        let mut state = self.state.lock().await;
        let Claim { mut job, .. } = state.in_flight.remove(&id).ok_or(QueueError::NotInFlight(id))?;
        if job.exhausted() {
            return Ok(FailOutcome::Dropped { attempts: job.attempts });
        }
        let attempts = job.attempts;
        job.run_at = retry_at;
        state.push(job);
        Ok(FailOutcome::Retrying { attempts, run_at: retry_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn job(kind: &str, run_at: DateTime<Utc>) -> Job {
        Job::new(kind, json!({}), run_at, 2)
    }

    #[tokio::test]
    async fn fetches_only_due_jobs_earliest_first() {
        let queue = InMemoryScheduler::new(2);
        queue.enqueue(job("late", t0() + Duration::hours(2))).await;
        queue.enqueue(job("second", t0() + Duration::minutes(5))).await;
        queue.enqueue(job("first", t0())).await;

        let due = queue.fetch_due(t0() + Duration::minutes(10), 10).await.unwrap();
        let kinds: Vec<_> = due.iter().map(|j| j.kind.as_str()).collect();
        assert_eq!(kinds, vec!["first", "second"]);
        assert!(due.iter().all(|j| j.attempts == 1));
        assert_eq!(queue.pending_count().await, 1);
        assert_eq!(queue.in_flight_count().await, 2);
    }

    #[tokio::test]
    async fn respects_batch_limit() {
        let queue = InMemoryScheduler::new(2);
        for _ in 0..3 {
            queue.enqueue(job("k", t0())).await;
        }
        assert_eq!(queue.fetch_due(t0(), 2).await.unwrap().len(), 2);
        assert_eq!(queue.pending_count().await, 1);
    }

    #[tokio::test]
    async fn failed_job_is_retried_once_then_dropped() {
        let queue = InMemoryScheduler::new(2);
        let id = queue.enqueue(job("k", t0())).await;

        queue.fetch_due(t0(), 1).await.unwrap();
        let retry_at = t0() + Duration::seconds(30);
        let outcome = queue.fail(id, "boom", retry_at).await.unwrap();
        assert_eq!(outcome, FailOutcome::Retrying { attempts: 1, run_at: retry_at });
        assert!(queue.fetch_due(t0(), 1).await.unwrap().is_empty());

        let again = queue.fetch_due(retry_at, 1).await.unwrap();
        assert_eq!(again[0].attempts, 2);
        let outcome = queue.fail(id, "boom", retry_at).await.unwrap();
        assert_eq!(outcome, FailOutcome::Dropped { attempts: 2 });
        assert_eq!(queue.pending_count().await, 0);
        assert_eq!(queue.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn expired_claim_is_delivered_again() {
        let queue = InMemoryScheduler::new(2).with_lease(std::time::Duration::from_secs(60));
        let id = queue.enqueue(job("k", t0())).await;
        queue.fetch_due(t0(), 1).await.unwrap();

        // Still leased.
        assert!(queue.fetch_due(t0() + Duration::seconds(59), 1).await.unwrap().is_empty());

        let again = queue.fetch_due(t0() + Duration::seconds(60), 1).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, id);
        assert_eq!(again[0].attempts, 2);
        assert_eq!(queue.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn expired_final_claim_is_dropped() {
        let queue = InMemoryScheduler::new(1).with_lease(std::time::Duration::from_secs(60));
        queue.enqueue(Job::new("k", json!({}), t0(), 1)).await;
        queue.fetch_due(t0(), 1).await.unwrap();

        assert!(queue.fetch_due(t0() + Duration::minutes(5), 1).await.unwrap().is_empty());
        assert_eq!(queue.pending_count().await, 0);
        assert_eq!(queue.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn completing_unknown_job_is_an_error() {
        let queue = InMemoryScheduler::new(2);
        assert!(matches!(queue.complete(Uuid::nil()).await, Err(QueueError::NotInFlight(_))));
    }
}
