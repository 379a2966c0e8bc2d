use activities::{ContinuationRequest, CONTINUATION_JOB_KIND};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::QueueError;

/// A unit of deferred work as stored by a job source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
    /// Deliveries so far, including the one in progress.
    pub attempts: u32,
    pub max_attempts: u32,
}

impl Job {
    pub fn new(kind: impl Into<String>, payload: Value, run_at: DateTime<Utc>, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            run_at,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn continuation(
        request: &ContinuationRequest,
        run_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Self, QueueError> {
        let payload = serde_json::to_value(request)?;
        Ok(Self::new(CONTINUATION_JOB_KIND, payload, run_at, max_attempts))
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// What a source did with a job whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { attempts: u32, run_at: DateTime<Utc> },
    Dropped { attempts: u32 },
}
