//! One-time passcode lifecycle.
//!
//! Codes are six digits drawn uniformly from `100000..=999999` with the OS
//! RNG. Only the SHA-256 hex digest is stored. Issuing replaces the unused
//! codes for the email with two statements (delete, then insert); two
//! concurrent issuances may both survive, in which case verification picks
//! the one with the latest expiry.

use crate::{
    store::{OtpRecord, OtpStore},
    utils::{constant_time_eq, sha256_hex},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{Rng, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info};
use uuid::Uuid;

const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;

/// Plaintext code handed to the email queue, never logged.
#[derive(Debug)]
pub struct IssuedOtp {
    pub code: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ResendOutcome {
    /// An unused, unexpired code already exists; nothing was issued.
    StillValid { expires_at: DateTime<Utc> },
    Issued(IssuedOtp),
}

#[derive(Clone)]
pub struct OtpManager {
    store: Arc<dyn OtpStore>,
    ttl: Duration,
}

fn generate_code() -> String {
    OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string()
}

impl OtpManager {
    #[must_use]
    pub fn new(store: Arc<dyn OtpStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a fresh code for `email`, replacing any unused one.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn issue(&self, email: &str) -> Result<IssuedOtp> {
        let code = generate_code();
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).context("otp ttl out of range")?;
        let record = OtpRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            otp_hash: sha256_hex(&code),
            expires_at: now + ttl,
            is_used: false,
            created_at: now,
        };

        let removed = self.store.delete_unused(email).await?;
        self.store.insert(&record).await?;
        debug!(replaced = removed, "otp issued");

        Ok(IssuedOtp {
            code: SecretString::from(code),
            expires_at: record.expires_at,
        })
    }

    /// Check `candidate` against the newest unused code and consume it on match.
    ///
    /// A wrong code leaves the record untouched. The record is marked used
    /// before this returns `true`, so a code verifies at most once.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn verify(&self, email: &str, candidate: &str) -> Result<bool> {
        let Some(record) = self.store.latest_unused(email).await? else {
            return Ok(false);
        };

        let candidate_hash = sha256_hex(candidate.trim());
        if !constant_time_eq(&record.otp_hash, &candidate_hash)
            || record.expires_at <= Utc::now()
            || record.is_used
        {
            return Ok(false);
        }

        // A concurrent verify may have consumed it between read and write.
        self.store.mark_used(record.id).await
    }

    /// Whether an unused, unexpired code exists for `email`.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn has_active(&self, email: &str) -> Result<bool> {
        Ok(self
            .store
            .latest_unused(email)
            .await?
            .is_some_and(|record| record.expires_at > Utc::now()))
    }

    /// Reuse a still-valid code or issue a new one.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn resend(&self, email: &str) -> Result<ResendOutcome> {
        if let Some(record) = self.store.latest_unused(email).await?
            && record.expires_at > Utc::now()
        {
            return Ok(ResendOutcome::StillValid {
                expires_at: record.expires_at,
            });
        }
        Ok(ResendOutcome::Issued(self.issue(email).await?))
    }

    /// Delete expired rows.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }
}

/// Periodically remove expired OTP rows.
pub fn spawn_otp_sweeper(manager: OtpManager, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match manager.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged expired otps"),
                Err(err) => error!("otp sweep failed: {err:#}"),
            }
        }
    })
}

impl IssuedOtp {
    /// Expose the plaintext for the outgoing email payload.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.code.expose_secret()
    }
}

impl std::fmt::Debug for OtpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpManager")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager(store: &MemoryStore, ttl: Duration) -> OtpManager {
        OtpManager::new(Arc::new(store.clone()), ttl)
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap_or(0);
            assert!((OTP_MIN..=OTP_MAX).contains(&value));
        }
    }

    #[tokio::test]
    async fn issue_leaves_exactly_one_selectable_record() -> Result<()> {
        let store = MemoryStore::new();
        let otp = manager(&store, Duration::from_secs(300));
        otp.issue("a@example.com").await?;
        otp.issue("a@example.com").await?;
        assert_eq!(store.otp_count("a@example.com").await, 1);
        assert!(otp.has_active("a@example.com").await?);
        Ok(())
    }

    #[tokio::test]
    async fn correct_code_verifies_exactly_once() -> Result<()> {
        let store = MemoryStore::new();
        let otp = manager(&store, Duration::from_secs(300));
        let issued = otp.issue("a@example.com").await?;

        assert!(otp.verify("a@example.com", issued.expose()).await?);
        assert!(!otp.verify("a@example.com", issued.expose()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_does_not_consume() -> Result<()> {
        let store = MemoryStore::new();
        let otp = manager(&store, Duration::from_secs(300));
        let issued = otp.issue("a@example.com").await?;
        let wrong = if issued.expose() == "123456" {
            "654321"
        } else {
            "123456"
        };

        assert!(!otp.verify("a@example.com", wrong).await?);
        assert!(otp.verify("a@example.com", issued.expose()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn expired_code_never_verifies() -> Result<()> {
        let store = MemoryStore::new();
        let otp = manager(&store, Duration::from_millis(10));
        let issued = otp.issue("a@example.com").await?;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!otp.verify("a@example.com", issued.expose()).await?);
        assert!(!otp.has_active("a@example.com").await?);
        assert_eq!(otp.purge_expired().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn resend_reports_still_valid_code() -> Result<()> {
        let store = MemoryStore::new();
        let otp = manager(&store, Duration::from_secs(300));
        assert!(matches!(
            otp.resend("a@example.com").await?,
            ResendOutcome::Issued(_)
        ));
        assert!(matches!(
            otp.resend("a@example.com").await?,
            ResendOutcome::StillValid { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_does_not_verify() -> Result<()> {
        let store = MemoryStore::new();
        let otp = manager(&store, Duration::from_secs(300));
        assert!(!otp.verify("nobody@example.com", "123456").await?);
        Ok(())
    }
}
