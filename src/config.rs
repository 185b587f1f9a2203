//! Runtime configuration for the core services.
//!
//! Built once by the CLI layer and handed to constructors; nothing in the
//! crate reads configuration from the environment after startup.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default OTP lifetime.
pub const DEFAULT_OTP_TTL_SECONDS: u64 = 5 * 60;
/// Default number of OTP requests admitted per window.
pub const DEFAULT_OTP_LIMIT: u32 = 5;
/// Default attempt-counter window.
pub const DEFAULT_OTP_WINDOW_SECONDS: u64 = 60 * 60;
/// Default block duration once the limit is hit.
pub const DEFAULT_OTP_BLOCK_SECONDS: u64 = 60 * 60;
/// Default access token lifetime.
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;
/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
/// OTP session (intent) token lifetime.
pub const DEFAULT_OTP_SESSION_TTL_SECONDS: u64 = 15 * 60;

const MIN_REFRESH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct CoreConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    credential_key: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
    otp_session_ttl: Duration,
    otp_ttl: Duration,
    otp_limit: u32,
    otp_window: Duration,
    otp_block: Duration,
}

impl CoreConfig {
    /// Create a config with the three required secrets and default lifetimes.
    ///
    /// `credential_key` is the passphrase the reversible credential cipher
    /// derives its key from.
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        credential_key: SecretString,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            credential_key,
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
            otp_session_ttl: Duration::from_secs(DEFAULT_OTP_SESSION_TTL_SECONDS),
            otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL_SECONDS),
            otp_limit: DEFAULT_OTP_LIMIT,
            otp_window: Duration::from_secs(DEFAULT_OTP_WINDOW_SECONDS),
            otp_block: Duration::from_secs(DEFAULT_OTP_BLOCK_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_otp_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.otp_session_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: u64) -> Self {
        self.otp_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_otp_limit(mut self, limit: u32) -> Self {
        self.otp_limit = limit;
        self
    }

    #[must_use]
    pub fn with_otp_window_seconds(mut self, seconds: u64) -> Self {
        self.otp_window = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_otp_block_seconds(mut self, seconds: u64) -> Self {
        self.otp_block = Duration::from_secs(seconds);
        self
    }

    /// Clamp values into their valid ranges.
    ///
    /// Refresh tokens live at least one day and always outlive access tokens;
    /// zero durations fall back to one second.
    #[must_use]
    pub fn normalize(self) -> Self {
        let non_zero = |duration: Duration| {
            if duration.is_zero() {
                Duration::from_secs(1)
            } else {
                duration
            }
        };
        let access_ttl = non_zero(self.access_ttl);
        let refresh_ttl = self.refresh_ttl.max(MIN_REFRESH_TTL).max(access_ttl);
        Self {
            access_ttl,
            refresh_ttl,
            otp_session_ttl: non_zero(self.otp_session_ttl),
            otp_ttl: non_zero(self.otp_ttl),
            otp_limit: self.otp_limit.max(1),
            otp_window: non_zero(self.otp_window),
            otp_block: non_zero(self.otp_block),
            ..self
        }
    }

    #[must_use]
    pub fn access_secret(&self) -> &SecretString {
        &self.access_secret
    }

    #[must_use]
    pub fn refresh_secret(&self) -> &SecretString {
        &self.refresh_secret
    }

    #[must_use]
    pub fn credential_key(&self) -> &SecretString {
        &self.credential_key
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    #[must_use]
    pub fn otp_session_ttl(&self) -> Duration {
        self.otp_session_ttl
    }

    #[must_use]
    pub fn otp_ttl(&self) -> Duration {
        self.otp_ttl
    }

    #[must_use]
    pub fn otp_limit(&self) -> u32 {
        self.otp_limit
    }

    #[must_use]
    pub fn otp_window(&self) -> Duration {
        self.otp_window
    }

    #[must_use]
    pub fn otp_block(&self) -> Duration {
        self.otp_block
    }

    /// Access and refresh tokens must be signed with different secrets.
    #[must_use]
    pub fn secrets_are_distinct(&self) -> bool {
        self.access_secret.expose_secret() != self.refresh_secret.expose_secret()
    }
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("access_secret", &"***")
            .field("refresh_secret", &"***")
            .field("credential_key", &"***")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("otp_session_ttl", &self.otp_session_ttl)
            .field("otp_ttl", &self.otp_ttl)
            .field("otp_limit", &self.otp_limit)
            .field("otp_window", &self.otp_window)
            .field("otp_block", &self.otp_block)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> CoreConfig {
    CoreConfig::new(
        SecretString::from("access-secret-for-tests"),
        SecretString::from("refresh-secret-for-tests"),
        SecretString::from("credential-key-for-tests"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = test_config();
        assert_eq!(config.access_ttl(), Duration::from_secs(900));
        assert_eq!(config.refresh_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.otp_session_ttl(), Duration::from_secs(900));
        assert_eq!(config.otp_limit(), 5);
        assert!(config.secrets_are_distinct());
    }

    #[test]
    fn normalize_clamps_refresh_ttl_and_zeroes() {
        let config = test_config()
            .with_refresh_ttl_seconds(60)
            .with_otp_ttl_seconds(0)
            .with_otp_limit(0)
            .normalize();
        assert_eq!(config.refresh_ttl(), MIN_REFRESH_TTL);
        assert_eq!(config.otp_ttl(), Duration::from_secs(1));
        assert_eq!(config.otp_limit(), 1);
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("access-secret-for-tests"));
        assert!(rendered.contains("***"));
    }
}
