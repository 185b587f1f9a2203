//! Token signing secrets and lifetimes.

use crate::config::{
    DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_OTP_SESSION_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS,
};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ACCESS_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_SECRET: &str = "refresh-token-secret";
pub const ARG_CREDENTIAL_KEY: &str = "credential-key";
pub const ARG_ACCESS_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_OTP_SESSION_TTL: &str = "otp-session-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_SECRET)
                .long(ARG_ACCESS_SECRET)
                .help("HMAC secret for access tokens")
                .env("TESSERA_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_SECRET)
                .long(ARG_REFRESH_SECRET)
                .help("HMAC secret for refresh and OTP session tokens")
                .env("TESSERA_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_CREDENTIAL_KEY)
                .long(ARG_CREDENTIAL_KEY)
                .help("Passphrase for the reversible credential cipher")
                .env("TESSERA_CREDENTIAL_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token TTL in seconds")
                .env("TESSERA_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token TTL in seconds (at least one day)")
                .env("TESSERA_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OTP_SESSION_TTL)
                .long(ARG_OTP_SESSION_TTL)
                .help("OTP session token TTL in seconds")
                .env("TESSERA_OTP_SESSION_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed by CORS")
                .env("TESSERA_FRONTEND_BASE_URL"),
        )
}

pub struct Options {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub credential_key: SecretString,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub otp_session_ttl_seconds: u64,
    pub frontend_base_url: Option<String>,
}

fn secret(matches: &ArgMatches, name: &str) -> Result<SecretString> {
    matches
        .get_one::<String>(name)
        .filter(|value| !value.trim().is_empty())
        .map(|value| SecretString::from(value.clone()))
        .with_context(|| format!("missing required argument: --{name}"))
}

impl Options {
    /// # Errors
    /// Returns an error if a secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            access_secret: secret(matches, ARG_ACCESS_SECRET)?,
            refresh_secret: secret(matches, ARG_REFRESH_SECRET)?,
            credential_key: secret(matches, ARG_CREDENTIAL_KEY)?,
            access_ttl_seconds: matches
                .get_one::<u64>(ARG_ACCESS_TTL)
                .copied()
                .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl_seconds: matches
                .get_one::<u64>(ARG_REFRESH_TTL)
                .copied()
                .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS),
            otp_session_ttl_seconds: matches
                .get_one::<u64>(ARG_OTP_SESSION_TTL)
                .copied()
                .unwrap_or(DEFAULT_OTP_SESSION_TTL_SECONDS),
            frontend_base_url: matches.get_one::<String>(ARG_FRONTEND_BASE_URL).cloned(),
        })
    }
}
