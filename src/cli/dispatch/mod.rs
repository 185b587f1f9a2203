//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an action carrying the full server
//! configuration.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, email, otp, storage};
use anyhow::{Result, bail};
use secrecy::ExposeSecret;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let auth_opts = auth::Options::parse(matches)?;
    if auth_opts.access_secret.expose_secret() == auth_opts.refresh_secret.expose_secret() {
        bail!("access and refresh token secrets must differ");
    }
    let otp_opts = otp::Options::parse(matches);
    let email_opts = email::Options::parse(matches)?;
    let storage_opts = storage::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: storage_opts.dsn,
        migrate: storage_opts.migrate,
        blob_base_url: storage_opts.blob_base_url,
        blob_token: storage_opts.blob_token,
        frontend_base_url: auth_opts.frontend_base_url,
        access_secret: auth_opts.access_secret,
        refresh_secret: auth_opts.refresh_secret,
        credential_key: auth_opts.credential_key,
        access_ttl_seconds: auth_opts.access_ttl_seconds,
        refresh_ttl_seconds: auth_opts.refresh_ttl_seconds,
        otp_session_ttl_seconds: auth_opts.otp_session_ttl_seconds,
        otp_ttl_seconds: otp_opts.ttl_seconds,
        otp_limit: otp_opts.limit,
        otp_window_seconds: otp_opts.window_seconds,
        otp_block_seconds: otp_opts.block_seconds,
        otp_sweep_seconds: otp_opts.sweep_seconds,
        smtp: email_opts.smtp,
        email_outbox: email_opts.outbox,
    }))
}
