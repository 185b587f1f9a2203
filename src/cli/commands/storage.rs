//! Database and object storage.
//!
//! Without `--dsn` every store lives in process memory, which is only useful
//! for local development.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_DSN: &str = "dsn";
pub const ARG_MIGRATE: &str = "migrate";
pub const ARG_BLOB_URL: &str = "blob-base-url";
pub const ARG_BLOB_TOKEN: &str = "blob-token";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string; in-memory stores are used when unset")
                .env("TESSERA_DSN"),
        )
        .arg(
            Arg::new(ARG_MIGRATE)
                .long(ARG_MIGRATE)
                .help("Apply the bundled schema before serving")
                .env("TESSERA_MIGRATE")
                .action(ArgAction::SetTrue)
                .requires(ARG_DSN),
        )
        .arg(
            Arg::new(ARG_BLOB_URL)
                .long(ARG_BLOB_URL)
                .help("Object store base URL for trade licence uploads (HTTP PUT)")
                .env("TESSERA_BLOB_BASE_URL"),
        )
        .arg(
            Arg::new(ARG_BLOB_TOKEN)
                .long(ARG_BLOB_TOKEN)
                .help("Bearer token sent with object store uploads")
                .env("TESSERA_BLOB_TOKEN")
                .hide_env_values(true),
        )
}

#[derive(Debug)]
pub struct Options {
    pub dsn: Option<String>,
    pub migrate: bool,
    pub blob_base_url: Option<Url>,
    pub blob_token: Option<SecretString>,
}

impl Options {
    /// # Errors
    /// Returns an error if the blob base URL does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let blob_base_url = matches
            .get_one::<String>(ARG_BLOB_URL)
            .map(|url| Url::parse(url).with_context(|| format!("invalid --{ARG_BLOB_URL}: {url}")))
            .transpose()?;
        Ok(Self {
            dsn: matches.get_one::<String>(ARG_DSN).cloned(),
            migrate: matches.get_flag(ARG_MIGRATE),
            blob_base_url,
            blob_token: matches
                .get_one::<String>(ARG_BLOB_TOKEN)
                .map(|token| SecretString::from(token.clone())),
        })
    }
}
