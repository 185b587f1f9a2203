//! Background delivery of queued email.
//!
//! Each tick releases expired leases, claims a batch and sends up to
//! `concurrency` messages at once. Delivered jobs are deleted; failures are
//! retried with exponential backoff and jitter until `max_attempts`, then
//! parked as `failed`. A payload that no longer decodes is parked right away.

use super::{ClaimedJob, EmailSender, JobQueue};
use anyhow::Result;
use futures::{StreamExt, stream};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    concurrency: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    lease: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5s poll interval, 10 messages per batch sent 5
    /// at a time, 5 max attempts, 5s->5m exponential backoff with jitter and
    /// a 10 minute processing lease.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            concurrency: 5,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            lease: Duration::from_secs(600),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_lease_seconds(mut self, seconds: u64) -> Self {
        self.lease = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = self.batch_size.max(1);
        let concurrency = self.concurrency.clamp(1, batch_size);
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        let lease = if self.lease < poll_interval {
            poll_interval
        } else {
            self.lease
        };
        Self {
            poll_interval,
            batch_size,
            concurrency,
            max_attempts,
            backoff_base,
            backoff_max,
            lease,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }

    #[must_use]
    pub fn lease(&self) -> Duration {
        self.lease
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that polls and drains the email queue.
pub fn spawn_email_worker(
    queue: Arc<dyn JobQueue>,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            match queue.release_stale(config.lease()).await {
                Ok(0) => {}
                Ok(released) => warn!(released, "released stale email jobs"),
                Err(err) => error!("failed to release stale email jobs: {err:#}"),
            }

            if let Err(err) = process_batch(queue.as_ref(), sender.as_ref(), &config).await {
                error!("email batch failed: {err:#}");
            }

            sleep(poll_interval).await;
        }
    })
}

/// Claim one batch and deliver it. Returns the number of claimed jobs.
///
/// # Errors
/// Returns an error only if claiming fails; per-job failures are recorded
/// on the job itself.
pub async fn process_batch(
    queue: &dyn JobQueue,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let jobs = queue.claim(config.batch_size()).await?;
    let claimed = jobs.len();
    if claimed == 0 {
        return Ok(0);
    }

    stream::iter(jobs)
        .for_each_concurrent(config.concurrency(), |job| async move {
            let id = job.id;
            if let Err(err) = deliver(queue, sender, config, job).await {
                error!(job_id = %id, "failed to record email outcome: {err:#}");
            }
        })
        .await;

    Ok(claimed)
}

async fn deliver(
    queue: &dyn JobQueue,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
    job: ClaimedJob,
) -> Result<()> {
    let attempt = job.attempts.saturating_add(1);

    let email = match job.decode() {
        Ok(email) => email,
        Err(err) => {
            warn!(job_id = %job.id, template = %job.template, "parking undecodable email job");
            return queue
                .park(job.id, attempt, &format!("invalid payload: {err}"))
                .await;
        }
    };

    let rendered = match email.template.render() {
        Ok(rendered) => rendered,
        Err(err) => {
            warn!(job_id = %job.id, template = %job.template, "parking unrenderable email job");
            return queue
                .park(job.id, attempt, &format!("render failed: {err}"))
                .await;
        }
    };
    match sender.send(&email.to, &rendered).await {
        Ok(()) => {
            debug!(job_id = %job.id, template = %job.template, "email delivered");
            queue.complete(job.id).await
        }
        Err(err) if attempt >= config.max_attempts() => {
            error!(job_id = %job.id, attempts = attempt, "email delivery failed permanently: {err:#}");
            queue.park(job.id, attempt, &err.to_string()).await
        }
        Err(err) => {
            let delay = backoff_delay(attempt, config.backoff_base(), config.backoff_max());
            warn!(job_id = %job.id, attempts = attempt, "email delivery failed, retrying: {err:#}");
            queue.retry(job.id, attempt, &err.to_string(), delay).await
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
