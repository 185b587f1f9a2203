//! OTP request throttling.
//!
//! Flow Overview:
//! 1) A block flag at `blocked_user:<email>` denies outright until it expires.
//! 2) The counter at `otp_request:<email>` is compared with the limit; reaching
//!    it sets the block flag and denies.
//! 3) Otherwise the counter is rewritten as `count + 1` and its TTL restarts,
//!    so the window is measured from the most recent attempt.
//!
//! The read-then-write is not atomic; concurrent requests can each observe the
//! same count. Store errors are returned to the caller, which fails closed.

use crate::kv::KeyValueStore;
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

pub const BLOCKED_REASON: &str = "Too many OTP requests. Please try again later.";

#[must_use]
pub fn otp_request_key(identity: &str) -> String {
    format!("otp_request:{identity}")
}

#[must_use]
pub fn blocked_user_key(identity: &str) -> String {
    format!("blocked_user:{identity}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied() -> Self {
        Self {
            allowed: false,
            reason: Some(BLOCKED_REASON.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct OtpRateLimiter {
    store: Arc<dyn KeyValueStore>,
    limit: u32,
    window: Duration,
    block: Duration,
}

impl OtpRateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, limit: u32, window: Duration, block: Duration) -> Self {
        Self {
            store,
            limit,
            window,
            block,
        }
    }

    /// Decide whether `identity` may receive another OTP.
    ///
    /// # Errors
    /// Returns an error if the key-value store cannot be read or written.
    pub async fn admit(&self, identity: &str) -> Result<Admission> {
        let blocked_key = blocked_user_key(identity);
        if self
            .store
            .get(&blocked_key)
            .await
            .context("failed to read block flag")?
            .is_some()
        {
            debug!("otp request denied: identity blocked");
            return Ok(Admission::denied());
        }

        let counter_key = otp_request_key(identity);
        let attempts = self
            .store
            .get(&counter_key)
            .await
            .context("failed to read otp request counter")?
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(0);

        if attempts >= self.limit {
            warn!(attempts, "otp request limit reached, blocking identity");
            self.store
                .set(&blocked_key, "true", self.block)
                .await
                .context("failed to set block flag")?;
            return Ok(Admission::denied());
        }

        self.store
            .set(
                &counter_key,
                &attempts.saturating_add(1).to_string(),
                self.window,
            )
            .await
            .context("failed to update otp request counter")?;

        Ok(Admission::allowed())
    }
}

impl std::fmt::Debug for OtpRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpRateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("block", &self.block)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;

    fn limiter(store: Arc<dyn KeyValueStore>, limit: u32) -> OtpRateLimiter {
        OtpRateLimiter::new(
            store,
            limit,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn denies_after_limit_then_stays_blocked() -> Result<()> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let limiter = limiter(Arc::clone(&store), 3);

        for _ in 0..3 {
            assert!(limiter.admit("user@example.com").await?.allowed);
        }

        let denied = limiter.admit("user@example.com").await?;
        assert!(!denied.allowed);
        assert_eq!(denied.reason.as_deref(), Some(BLOCKED_REASON));
        assert_eq!(
            store
                .get(&blocked_user_key("user@example.com"))
                .await?
                .as_deref(),
            Some("true")
        );

        // Denied by the block flag even if the counter disappeared.
        store.delete(&otp_request_key("user@example.com")).await?;
        assert!(!limiter.admit("user@example.com").await?.allowed);
        Ok(())
    }

    #[tokio::test]
    async fn identities_are_independent() -> Result<()> {
        let limiter = limiter(Arc::new(MemoryKeyValueStore::new()), 1);
        assert!(limiter.admit("a@example.com").await?.allowed);
        assert!(!limiter.admit("a@example.com").await?.allowed);
        assert!(limiter.admit("b@example.com").await?.allowed);
        Ok(())
    }

    #[tokio::test]
    async fn unparsable_counter_counts_as_zero() -> Result<()> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        store
            .set(
                &otp_request_key("c@example.com"),
                "garbage",
                Duration::from_secs(60),
            )
            .await?;
        let limiter = limiter(Arc::clone(&store), 2);
        assert!(limiter.admit("c@example.com").await?.allowed);
        assert_eq!(
            store
                .get(&otp_request_key("c@example.com"))
                .await?
                .as_deref(),
            Some("1")
        );
        Ok(())
    }

    #[tokio::test]
    async fn block_expires_with_its_ttl() -> Result<()> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let limiter = OtpRateLimiter::new(
            Arc::clone(&store),
            1,
            Duration::from_millis(30),
            Duration::from_millis(30),
        );
        assert!(limiter.admit("d@example.com").await?.allowed);
        assert!(!limiter.admit("d@example.com").await?.allowed);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.admit("d@example.com").await?.allowed);
        Ok(())
    }
}
