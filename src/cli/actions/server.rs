use crate::{
    api::{self, Database},
    blob::{BlobStore, HttpBlobStore, MemoryBlobStore},
    cli::commands::email::{OutboxOptions, SmtpOptions},
    config::CoreConfig,
    core::{Backends, Core},
    email::{
        EmailSender, EmailWorkerConfig, LogEmailSender, SmtpConfig, SmtpEmailSender,
        spawn_email_worker,
    },
    kv::spawn_kv_sweeper,
    notifications::{LogNotificationSink, NotificationSink},
    otp::spawn_otp_sweeper,
    store::PgStore,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub migrate: bool,
    pub blob_base_url: Option<Url>,
    pub blob_token: Option<SecretString>,
    pub frontend_base_url: Option<String>,
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub credential_key: SecretString,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub otp_session_ttl_seconds: u64,
    pub otp_ttl_seconds: u64,
    pub otp_limit: u32,
    pub otp_window_seconds: u64,
    pub otp_block_seconds: u64,
    pub otp_sweep_seconds: u64,
    pub smtp: Option<SmtpOptions>,
    pub email_outbox: OutboxOptions,
}

impl Args {
    fn core_config(&self) -> CoreConfig {
        CoreConfig::new(
            self.access_secret.clone(),
            self.refresh_secret.clone(),
            self.credential_key.clone(),
        )
        .with_access_ttl_seconds(self.access_ttl_seconds)
        .with_refresh_ttl_seconds(self.refresh_ttl_seconds)
        .with_otp_session_ttl_seconds(self.otp_session_ttl_seconds)
        .with_otp_ttl_seconds(self.otp_ttl_seconds)
        .with_otp_limit(self.otp_limit)
        .with_otp_window_seconds(self.otp_window_seconds)
        .with_otp_block_seconds(self.otp_block_seconds)
        .normalize()
    }

    fn worker_config(&self) -> EmailWorkerConfig {
        let outbox = &self.email_outbox;
        EmailWorkerConfig::new()
            .with_poll_interval_seconds(outbox.poll_seconds)
            .with_batch_size(outbox.batch_size)
            .with_concurrency(outbox.concurrency)
            .with_max_attempts(outbox.max_attempts)
            .with_backoff_base_seconds(outbox.backoff_base_seconds)
            .with_backoff_max_seconds(outbox.backoff_max_seconds)
            .with_lease_seconds(outbox.lease_seconds)
            .normalize()
    }

    fn blob_store(&self) -> Result<Arc<dyn BlobStore>> {
        if let Some(url) = &self.blob_base_url {
            let store = HttpBlobStore::new(url.clone(), self.blob_token.clone())?;
            return Ok(Arc::new(store));
        }
        warn!("no --blob-base-url, trade licences are kept in memory");
        Ok(Arc::new(MemoryBlobStore::new()))
    }

    fn email_sender(&self) -> Result<Arc<dyn EmailSender>> {
        let Some(smtp) = &self.smtp else {
            warn!("no --smtp-host, emails are logged instead of sent");
            return Ok(Arc::new(LogEmailSender));
        };
        let config = SmtpConfig::new(
            smtp.host.clone(),
            smtp.username.clone(),
            smtp.password.clone(),
            smtp.from.clone(),
        )
        .with_port(smtp.port);
        let sender = SmtpEmailSender::new(&config).context("Failed to build SMTP transport")?;
        Ok(Arc::new(sender))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the schema fails to
/// apply, a transport cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.core_config();
    debug!("Core config: {:?}", config);

    let sink: Arc<dyn NotificationSink> = Arc::new(LogNotificationSink);
    let blobs = args.blob_store()?;

    let (backends, database) = match &args.dsn {
        Some(dsn) => {
            let pool = api::connect(dsn).await?;
            if args.migrate {
                PgStore::new(pool.clone()).migrate().await?;
                info!("Schema applied");
            }
            (
                Backends::postgres(pool.clone(), blobs, sink),
                Database::Postgres(pool),
            )
        }
        None => {
            warn!("no --dsn, all state is kept in memory and lost on restart");
            let (mut backends, _handles) = Backends::memory();
            backends.blobs = blobs;
            backends.sink = sink;
            (backends, Database::InMemory)
        }
    };

    spawn_kv_sweeper(
        backends.kv.clone(),
        Duration::from_secs(args.otp_sweep_seconds),
    );
    let core = Core::new(&config, backends);

    spawn_email_worker(core.queue.clone(), args.email_sender()?, args.worker_config());
    spawn_otp_sweeper(
        core.otp.clone(),
        Duration::from_secs(args.otp_sweep_seconds),
    );

    api::new(
        args.port,
        core,
        database,
        args.frontend_base_url.as_deref(),
    )
    .await
}
