//! Row structs that map 1-to-1 onto database tables.
//!
//! These are persistence models; the domain job type lives in the `queue`
//! crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use queue::Job;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// continuation_jobs
// ---------------------------------------------------------------------------

/// Possible statuses for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    /// Gave up after `max_attempts` deliveries.
    Dropped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending    => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed  => write!(f, "completed"),
            Self::Dropped    => write!(f, "dropped"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"    => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed"  => Ok(Self::Completed),
            "dropped"    => Ok(Self::Dropped),
            other        => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A job row fetched from the queue table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    pub fn status(&self) -> Result<JobStatus, DbError> {
        self.status.parse().map_err(DbError::InvalidRow)
    }

    pub fn into_job(self) -> Result<Job, DbError> {
        let id = self.id;
        let count = |v: i32, field: &str| {
            u32::try_from(v).map_err(|_| DbError::InvalidRow(format!("job {id}: negative {field}")))
        };
        Ok(Job {
            attempts: count(self.attempts, "attempts")?,
            max_attempts: count(self.max_attempts, "max_attempts")?,
            id,
            kind: self.kind,
            payload: self.payload,
            run_at: self.run_at,
        })
    }
}
