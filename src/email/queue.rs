//! Durable email job queue.
//!
//! Rows move `pending -> processing` when claimed. A delivered job is
//! deleted; a failed one goes back to `pending` with a later
//! `next_attempt_at`, or to `failed` once it runs out of attempts.
//! `processing` rows whose lease expired (worker crashed mid-send) are put
//! back to `pending` by [`JobQueue::release_stale`].

use super::{EmailJob, EmailTemplate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{Instrument, info_span};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub attempts: u32,
    pub to_email: String,
    pub template: String,
    pub payload: Value,
}

impl ClaimedJob {
    /// # Errors
    /// Returns an error when the stored payload does not match its template.
    pub fn decode(&self) -> Result<EmailJob, serde_json::Error> {
        Ok(EmailJob {
            to: self.to_email.clone(),
            template: EmailTemplate::from_parts(&self.template, self.payload.clone())?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &EmailJob) -> Result<Uuid>;

    /// Lock up to `batch` due jobs and mark them `processing`.
    async fn claim(&self, batch: usize) -> Result<Vec<ClaimedJob>>;

    /// Remove a delivered job.
    async fn complete(&self, id: Uuid) -> Result<()>;

    /// Reschedule a failed job after `delay`.
    async fn retry(&self, id: Uuid, attempts: u32, error: &str, delay: Duration) -> Result<()>;

    /// Stop retrying a job and keep it for inspection.
    async fn park(&self, id: Uuid, attempts: u32, error: &str) -> Result<()>;

    /// Return `processing` jobs locked longer than `lease` to `pending`.
    async fn release_stale(&self, lease: Duration) -> Result<u64>;

    async fn stats(&self) -> Result<QueueStats>;
}

#[derive(Clone, Debug)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn attempts_i32(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &EmailJob) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let payload = job
            .template
            .data()
            .context("failed to serialize email payload")?
            .to_string();

        let query = r"
            INSERT INTO email_outbox (id, to_email, template, payload_json)
            VALUES ($1, $2, $3, $4::jsonb)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(&job.to)
            .bind(job.template.name())
            .bind(payload)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to enqueue email")?;

        Ok(id)
    }

    async fn claim(&self, batch: usize) -> Result<Vec<ClaimedJob>> {
        // SKIP LOCKED lets several workers claim disjoint batches.
        let query = r"
            UPDATE email_outbox
            SET status = 'processing',
                locked_at = NOW()
            WHERE id IN (
                SELECT id
                FROM email_outbox
                WHERE status = 'pending'
                  AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC, created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, to_email, template, payload_json::text AS payload_json, attempts
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(i64::try_from(batch).unwrap_or(0))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to claim email batch")?;

        rows.into_iter()
            .map(|row| -> Result<ClaimedJob> {
                let attempts: i32 = row.try_get("attempts")?;
                let payload: String = row.try_get("payload_json")?;
                Ok(ClaimedJob {
                    id: row.try_get("id")?,
                    attempts: u32::try_from(attempts).unwrap_or(0),
                    to_email: row.try_get("to_email")?,
                    template: row.try_get("template")?,
                    // Unparsable JSON becomes Null and is parked by the worker.
                    payload: serde_json::from_str(&payload).unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let query = "DELETE FROM email_outbox WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete delivered email")?;
        Ok(())
    }

    async fn retry(&self, id: Uuid, attempts: u32, error: &str, delay: Duration) -> Result<()> {
        let query = r"
            UPDATE email_outbox
            SET status = 'pending',
                attempts = $2,
                last_error = $3,
                locked_at = NULL,
                next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(attempts_i32(attempts))
            .bind(error)
            .bind(millis(delay))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reschedule email")?;
        Ok(())
    }

    async fn park(&self, id: Uuid, attempts: u32, error: &str) -> Result<()> {
        let query = r"
            UPDATE email_outbox
            SET status = 'failed',
                attempts = $2,
                last_error = $3,
                locked_at = NULL
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(attempts_i32(attempts))
            .bind(error)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to park email")?;
        Ok(())
    }

    async fn release_stale(&self, lease: Duration) -> Result<u64> {
        let query = r"
            UPDATE email_outbox
            SET status = 'pending',
                locked_at = NULL
            WHERE status = 'processing'
              AND locked_at < NOW() - ($1 * INTERVAL '1 millisecond')
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(millis(lease))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to release stale email jobs")?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let query = "SELECT status, COUNT(*) AS total FROM email_outbox GROUP BY status";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to count email jobs")?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            let total = u64::try_from(total).unwrap_or(0);
            match status.as_str() {
                "pending" => stats.pending = total,
                "processing" => stats.processing = total,
                "failed" => stats.failed = total,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Pending,
    Processing,
    Failed,
}

#[derive(Debug, Clone)]
struct MemoryJob {
    id: Uuid,
    to_email: String,
    template: String,
    payload: Value,
    status: JobStatus,
    attempts: u32,
    last_error: Option<String>,
    next_attempt_at: Instant,
    locked_at: Option<Instant>,
}

/// In-process queue for development and tests.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<MemoryJob>>,
}

impl MemoryJobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, without checking that it decodes.
    pub async fn push_raw(&self, to_email: &str, template: &str, payload: Value) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.lock().await.push(MemoryJob {
            id,
            to_email: to_email.to_string(),
            template: template.to_string(),
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: Instant::now(),
            locked_at: None,
        });
        id
    }

    /// Decoded jobs still waiting for delivery, oldest first.
    pub async fn pending_jobs(&self) -> Vec<EmailJob> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|job| job.status == JobStatus::Pending)
            .filter_map(|job| {
                EmailTemplate::from_parts(&job.template, job.payload.clone())
                    .ok()
                    .map(|template| EmailJob::new(job.to_email.clone(), template))
            })
            .collect()
    }

    pub async fn last_error(&self, id: Uuid) -> Option<String> {
        self.jobs
            .lock()
            .await
            .iter()
            .find(|job| job.id == id)
            .and_then(|job| job.last_error.clone())
    }

    pub async fn attempts(&self, id: Uuid) -> Option<u32> {
        self.jobs
            .lock()
            .await
            .iter()
            .find(|job| job.id == id)
            .map(|job| job.attempts)
    }

    /// Make every pending job due now.
    pub async fn make_due(&self) {
        let now = Instant::now();
        for job in self.jobs.lock().await.iter_mut() {
            if job.status == JobStatus::Pending {
                job.next_attempt_at = now;
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &EmailJob) -> Result<Uuid> {
        let payload = job
            .template
            .data()
            .context("failed to serialize email payload")?;
        Ok(self
            .push_raw(&job.to, job.template.name(), payload)
            .await)
    }

    async fn claim(&self, batch: usize) -> Result<Vec<ClaimedJob>> {
        let now = Instant::now();
        let mut jobs = self.jobs.lock().await;
        let mut due: Vec<&mut MemoryJob> = jobs
            .iter_mut()
            .filter(|job| job.status == JobStatus::Pending && job.next_attempt_at <= now)
            .collect();
        due.sort_by_key(|job| job.next_attempt_at);

        Ok(due
            .into_iter()
            .take(batch)
            .map(|job| {
                job.status = JobStatus::Processing;
                job.locked_at = Some(now);
                ClaimedJob {
                    id: job.id,
                    attempts: job.attempts,
                    to_email: job.to_email.clone(),
                    template: job.template.clone(),
                    payload: job.payload.clone(),
                }
            })
            .collect())
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        self.jobs.lock().await.retain(|job| job.id != id);
        Ok(())
    }

    async fn retry(&self, id: Uuid, attempts: u32, error: &str, delay: Duration) -> Result<()> {
        if let Some(job) = self.jobs.lock().await.iter_mut().find(|job| job.id == id) {
            job.status = JobStatus::Pending;
            job.attempts = attempts;
            job.last_error = Some(error.to_string());
            job.locked_at = None;
            job.next_attempt_at = Instant::now() + delay;
        }
        Ok(())
    }

    async fn park(&self, id: Uuid, attempts: u32, error: &str) -> Result<()> {
        if let Some(job) = self.jobs.lock().await.iter_mut().find(|job| job.id == id) {
            job.status = JobStatus::Failed;
            job.attempts = attempts;
            job.last_error = Some(error.to_string());
            job.locked_at = None;
        }
        Ok(())
    }

    async fn release_stale(&self, lease: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut released = 0;
        for job in self.jobs.lock().await.iter_mut() {
            let expired = job
                .locked_at
                .is_some_and(|locked| now.duration_since(locked) >= lease);
            if job.status == JobStatus::Processing && expired {
                job.status = JobStatus::Pending;
                job.locked_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        for job in self.jobs.lock().await.iter() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}
