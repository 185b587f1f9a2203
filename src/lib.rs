//! # Tessera (OTP login, token issuance and vendor onboarding)
//!
//! `tessera` is the credential-issuance and account-onboarding core of a
//! multi-role platform (consumers, vendors and admins).
//!
//! ## Login
//!
//! Login is passwordless by default: a six digit one-time passcode (OTP) is
//! mailed to the account email and exchanged, together with a short lived
//! OTP session token, for an access/refresh token pair. Every OTP issuing path
//! goes through the [`rate_limit::OtpRateLimiter`], a counter plus block flag
//! kept in a TTL key-value store.
//!
//! ## Onboarding
//!
//! Vendor registration uploads the trade licence, then creates the `User` and
//! `Vendor` records inside a single transaction. Confirmation emails are queued
//! only after commit and never fail the request.
//!
//! ## Fan-out
//!
//! Notifications are persisted first and then pushed best-effort to a per-user
//! channel. Emails go through a durable outbox drained by a background worker
//! with bounded concurrency and bounded retries.

pub mod api;
pub mod auth;
pub mod blob;
pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod email;
pub mod error;
pub mod kv;
pub mod notifications;
pub mod onboarding;
pub mod otp;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod token;
pub mod utils;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
