//! SMTP transport and outbox worker settings.
//!
//! Without `--smtp-host` emails are rendered and logged instead of sent.

use anyhow::{Result, anyhow};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_FROM: &str = "smtp-from";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_smtp_args(command);
    with_outbox_args(command)
}

fn with_smtp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; emails are only logged when unset")
                .env("TESSERA_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port (STARTTLS)")
                .env("TESSERA_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("TESSERA_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("TESSERA_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SMTP_FROM)
                .long(ARG_SMTP_FROM)
                .help("From address, e.g. \"Tessera <no-reply@tessera.dev>\"")
                .env("TESSERA_SMTP_FROM"),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("TESSERA_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("TESSERA_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-concurrency")
                .long("email-outbox-concurrency")
                .help("Emails delivered in parallel")
                .env("TESSERA_EMAIL_OUTBOX_CONCURRENCY")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before parking an email as failed")
                .env("TESSERA_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("TESSERA_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("TESSERA_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-lease-seconds")
                .long("email-outbox-lease-seconds")
                .help("Claimed jobs older than this are returned to the queue")
                .env("TESSERA_EMAIL_OUTBOX_LEASE_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

#[derive(Debug, Clone, Copy)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
    pub lease_seconds: u64,
}

#[derive(Debug)]
pub struct Options {
    pub smtp: Option<SmtpOptions>,
    pub outbox: OutboxOptions,
}

impl Options {
    /// # Errors
    /// Returns an error if `--smtp-host` is set without credentials or a
    /// from address.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let smtp = match matches.get_one::<String>(ARG_SMTP_HOST) {
            Some(host) => {
                let required = |name: &str| {
                    matches
                        .get_one::<String>(name)
                        .cloned()
                        .ok_or_else(|| anyhow!("--{name} is required with --{ARG_SMTP_HOST}"))
                };
                Some(SmtpOptions {
                    host: host.clone(),
                    port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
                    username: required(ARG_SMTP_USERNAME)?,
                    password: SecretString::from(required(ARG_SMTP_PASSWORD)?),
                    from: required(ARG_SMTP_FROM)?,
                })
            }
            None => None,
        };

        let outbox = OutboxOptions {
            poll_seconds: matches
                .get_one::<u64>("email-outbox-poll-seconds")
                .copied()
                .unwrap_or(5),
            batch_size: matches
                .get_one::<usize>("email-outbox-batch-size")
                .copied()
                .unwrap_or(10),
            concurrency: matches
                .get_one::<usize>("email-outbox-concurrency")
                .copied()
                .unwrap_or(5),
            max_attempts: matches
                .get_one::<u32>("email-outbox-max-attempts")
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>("email-outbox-backoff-base-seconds")
                .copied()
                .unwrap_or(5),
            backoff_max_seconds: matches
                .get_one::<u64>("email-outbox-backoff-max-seconds")
                .copied()
                .unwrap_or(300),
            lease_seconds: matches
                .get_one::<u64>("email-outbox-lease-seconds")
                .copied()
                .unwrap_or(600),
        };

        Ok(Self { smtp, outbox })
    }
}
