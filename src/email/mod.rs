//! Typed email jobs and their delivery pipeline.
//!
//! Services enqueue an [`EmailJob`] into a durable [`JobQueue`]; the
//! background worker claims pending jobs, renders the template selected by
//! the job type and hands the result to an [`EmailSender`].
//!
//! On the wire a job is `{ "type": "<template>", "to": "<address>", "data": {...} }`.
//! The template enum fixes the data fields each type requires, so a job with
//! missing fields cannot be built in code and cannot be decoded from storage.

use askama::Template;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod queue;
mod sender;
mod worker;

pub use queue::{ClaimedJob, JobQueue, MemoryJobQueue, PgJobQueue, QueueStats};
pub use sender::{EmailError, EmailSender, LogEmailSender, SmtpConfig, SmtpEmailSender};
pub use worker::{EmailWorkerConfig, process_batch, spawn_email_worker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum EmailTemplate {
    OtpEmail { receiver_name: String, otp: String },
    LoginEmail { receiver_name: String },
    RegisterVendorEmail { receiver_name: String },
    VendorVerifiedEmail { receiver_name: String },
}

#[derive(Template)]
#[template(path = "email/message.html")]
struct MessageHtml<'a> {
    receiver_name: &'a str,
    body: &'a str,
}

#[derive(Template)]
#[template(path = "email/message.txt")]
struct MessageText<'a> {
    receiver_name: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailTemplate {
    /// Template name as stored in the queue.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OtpEmail { .. } => "otpEmail",
            Self::LoginEmail { .. } => "loginEmail",
            Self::RegisterVendorEmail { .. } => "registerVendorEmail",
            Self::VendorVerifiedEmail { .. } => "vendorVerifiedEmail",
        }
    }

    #[must_use]
    pub const fn subject(&self) -> &'static str {
        match self {
            Self::OtpEmail { .. } => "Your one-time login code",
            Self::LoginEmail { .. } => "Login to our platform",
            Self::RegisterVendorEmail { .. } => {
                "Your Vendor Account Has Been Created – Pending Approval"
            }
            Self::VendorVerifiedEmail { .. } => "Your Vendor Account Has Been Verified",
        }
    }

    /// Template data without the tag.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Rebuild a template from its stored name and data.
    ///
    /// # Errors
    /// Returns an error for unknown names or missing fields.
    pub fn from_parts(name: &str, data: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "type": name, "data": data }))
    }

    /// Render subject, plain text and HTML bodies.
    ///
    /// # Errors
    /// Returns an error if a template fails to render.
    pub fn render(&self) -> Result<RenderedEmail, askama::Error> {
        let (receiver_name, body) = match self {
            Self::OtpEmail { receiver_name, otp } => (
                receiver_name.as_str(),
                format!(
                    "Your one-time login code is {otp}. It expires shortly and can be used once."
                ),
            ),
            Self::LoginEmail { receiver_name } => (
                receiver_name.as_str(),
                "A new login to your account was just completed. If this was not you, contact support right away."
                    .to_string(),
            ),
            Self::RegisterVendorEmail { receiver_name } => (
                receiver_name.as_str(),
                "Your vendor account has been created and is pending approval. We will email you once it has been reviewed."
                    .to_string(),
            ),
            Self::VendorVerifiedEmail { receiver_name } => (
                receiver_name.as_str(),
                "Your vendor account has been verified. You can now sign in with the password provided by our team."
                    .to_string(),
            ),
        };

        let html = MessageHtml {
            receiver_name,
            body: &body,
        }
        .render()?;
        let text = MessageText {
            receiver_name,
            body: &body,
        }
        .render()?;

        Ok(RenderedEmail {
            subject: self.subject().to_string(),
            text,
            html,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EmailJobWire", into = "EmailJobWire")]
pub struct EmailJob {
    pub to: String,
    pub template: EmailTemplate,
}

impl EmailJob {
    #[must_use]
    pub fn new(to: impl Into<String>, template: EmailTemplate) -> Self {
        Self {
            to: to.into(),
            template,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EmailJobWire {
    #[serde(rename = "type")]
    kind: String,
    to: String,
    data: Value,
}

impl TryFrom<EmailJobWire> for EmailJob {
    type Error = serde_json::Error;

    fn try_from(wire: EmailJobWire) -> Result<Self, Self::Error> {
        Ok(Self {
            to: wire.to,
            template: EmailTemplate::from_parts(&wire.kind, wire.data)?,
        })
    }
}

impl From<EmailJob> for EmailJobWire {
    fn from(job: EmailJob) -> Self {
        Self {
            kind: job.template.name().to_string(),
            data: job.template.data().unwrap_or(Value::Null),
            to: job.to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_wire_format_is_type_to_data() -> Result<(), serde_json::Error> {
        let job = EmailJob::new(
            "ada@example.com",
            EmailTemplate::OtpEmail {
                receiver_name: "Ada".to_string(),
                otp: "123456".to_string(),
            },
        );
        let value = serde_json::to_value(&job)?;
        assert_eq!(
            value,
            json!({
                "type": "otpEmail",
                "to": "ada@example.com",
                "data": { "receiverName": "Ada", "otp": "123456" }
            })
        );
        let back: EmailJob = serde_json::from_value(value)?;
        assert_eq!(back, job);
        Ok(())
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result: Result<EmailJob, _> = serde_json::from_value(json!({
            "type": "otpEmail",
            "to": "ada@example.com",
            "data": { "receiverName": "Ada" }
        }));
        assert!(result.is_err());

        let unknown: Result<EmailJob, _> = serde_json::from_value(json!({
            "type": "newsletter",
            "to": "ada@example.com",
            "data": {}
        }));
        assert!(unknown.is_err());
    }

    #[test]
    fn render_uses_template_subject_and_escapes_html() -> anyhow::Result<()> {
        let rendered = EmailTemplate::RegisterVendorEmail {
            receiver_name: "<Bob & Co>".to_string(),
        }
        .render()?;
        assert_eq!(
            rendered.subject,
            "Your Vendor Account Has Been Created – Pending Approval"
        );
        assert!(rendered.html.contains("&lt;Bob &amp; Co&gt;"));
        assert!(rendered.text.starts_with("Hello <Bob & Co>,"));
        assert!(!rendered.html.contains("<Bob"));
        Ok(())
    }

    #[test]
    fn otp_code_appears_in_body() -> anyhow::Result<()> {
        let rendered = EmailTemplate::OtpEmail {
            receiver_name: "Ada".to_string(),
            otp: "424242".to_string(),
        }
        .render()?;
        assert!(rendered.text.contains("424242"));
        assert!(rendered.html.contains("<p>Hello Ada,</p>"));
        Ok(())
    }
}
