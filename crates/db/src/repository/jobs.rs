//! Continuation queue repository functions.
//!
//! The queue is backed by the `continuation_jobs` Postgres table. Workers
//! poll it with `SELECT … FOR UPDATE SKIP LOCKED` so concurrent workers never
//! claim the same row. A claim is a lease: `updated_at` records when it was
//! taken, and a row left `processing` past the lease is claimed again.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{models::JobRow, DbError};

const COLUMNS: &str =
    "id, kind, payload, run_at, status, attempts, max_attempts, last_error, created_at, updated_at";

/// Insert a pending job that becomes due at `run_at`.
pub async fn enqueue_job(
    pool: &PgPool,
    id: Uuid,
    kind: &str,
    payload: serde_json::Value,
    run_at: DateTime<Utc>,
    max_attempts: i32,
) -> Result<JobRow, DbError> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO continuation_jobs
             (id, kind, payload, run_at, status, attempts, max_attempts, created_at, updated_at)
         VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6, $6)
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, JobRow>(&sql)
        .bind(id)
        .bind(kind)
        .bind(payload)
        .bind(run_at)
        .bind(max_attempts)
        .bind(now)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Atomically claim up to `limit` due jobs, oldest `run_at` first, marking
/// them `processing` and counting the delivery attempt.
///
/// Rows still `processing` with a claim made at or before `lease_cutoff`
/// were abandoned by their worker: those with attempts left are claimed
/// again, the rest are marked `dropped`. A `None` cutoff expires nothing.
pub async fn fetch_due_jobs(
    pool: &PgPool,
    now: DateTime<Utc>,
    lease_cutoff: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<JobRow>, DbError> {
    let mut tx = pool.begin().await?;

    let dropped: Vec<Uuid> = sqlx::query_scalar(
        "UPDATE continuation_jobs
         SET status = 'dropped', last_error = 'claim expired after final attempt', updated_at = $2
         WHERE status = 'processing' AND updated_at <= $1 AND attempts >= max_attempts
         RETURNING id",
    )
    .bind(lease_cutoff)
    .bind(now)
    .fetch_all(&mut *tx)
    .await?;
    for id in &dropped {
        warn!(job_id = %id, "claim expired after final attempt, job dropped");
    }

    let select = format!(
        "SELECT {COLUMNS}
         FROM continuation_jobs
         WHERE run_at <= $1
           AND (status = 'pending' OR (status = 'processing' AND updated_at <= $2))
         ORDER BY run_at ASC
         LIMIT $3
         FOR UPDATE SKIP LOCKED"
    );
    let mut rows = sqlx::query_as::<_, JobRow>(&select)
        .bind(now)
        .bind(lease_cutoff)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

    if rows.is_empty() {
        tx.commit().await?;
        return Ok(rows);
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    sqlx::query(
        "UPDATE continuation_jobs
         SET status = 'processing', attempts = attempts + 1, updated_at = $1
         WHERE id = ANY($2)",
    )
    .bind(now)
    .bind(&ids)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    for row in &mut rows {
        if row.status == "processing" {
            debug!(job_id = %row.id, "expired claim taken over");
        }
        row.status = "processing".into();
        row.attempts += 1;
        row.updated_at = now;
    }
    Ok(rows)
}

/// Mark a job as completed.
pub async fn complete_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    let done = sqlx::query(
        "UPDATE continuation_jobs SET status = 'completed', updated_at = $1
         WHERE id = $2 AND status = 'processing'",
    )
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;
    if done.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Return a failed job to `pending` at `retry_at`, or mark it `dropped`
/// once it has used `max_attempts` deliveries. Returns the updated row.
pub async fn fail_job(
    pool: &PgPool,
    job_id: Uuid,
    error: &str,
    retry_at: DateTime<Utc>,
) -> Result<JobRow, DbError> {
    let sql = format!(
        "UPDATE continuation_jobs
         SET status = CASE WHEN attempts >= max_attempts THEN 'dropped' ELSE 'pending' END,
             run_at = CASE WHEN attempts >= max_attempts THEN run_at ELSE $3 END,
             last_error = $2,
             updated_at = $4
         WHERE id = $1 AND status = 'processing'
         RETURNING {COLUMNS}"
    );
    sqlx::query_as::<_, JobRow>(&sql)
        .bind(job_id)
        .bind(error)
        .bind(retry_at)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}
