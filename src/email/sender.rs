use super::RenderedEmail;
use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::info;

/// Email delivery abstraction used by the queue worker.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the job is retried.
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
///
/// Only the recipient and subject are logged; bodies may carry login codes.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<()> {
        info!(to_email = %to, subject = %email.subject, "email send stub");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

#[derive(Clone)]
pub struct SmtpConfig {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    from_address: String,
}

impl SmtpConfig {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 587,
            username: username.into(),
            password,
            from_address: from_address.into(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn from_address(&self) -> &str {
        &self.from_address
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Sends over SMTP with STARTTLS using a pooled async transport.
#[derive(Clone)]
pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpEmailSender {
    /// # Errors
    /// Returns an error if the relay host cannot be resolved into a transport.
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    fn message(&self, to: &str, email: &RenderedEmail) -> Result<Message, EmailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(email.subject.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )?;
        Ok(message)
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<()> {
        let message = self.message(to, email)?;
        self.mailer.send(message).await.map_err(EmailError::from)?;
        info!(to_email = %to, subject = %email.subject, "email sent");
        Ok(())
    }
}

impl std::fmt::Debug for SmtpEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpEmailSender")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}
