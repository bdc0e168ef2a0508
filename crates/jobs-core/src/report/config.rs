//! Declarative report configuration and the email-job template shape.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Declarative settings for one report. The non-serializable pieces (the
/// email-template builder, the optional user predicate) live in
/// `ReportOptions` alongside this, passed separately to `Service::add_report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// `(column_name, json_pointer)` pairs, in header order. A pointer of
    /// `"errorMappings"` is the special sentinel described in §4.6.1.
    pub job_mappings: Vec<(String, String)>,

    /// `failKind -> label` used when a mapping is `"errorMappings"`.
    #[serde(default)]
    pub error_mappings: std::collections::HashMap<String, String>,

    /// Six-field seconds-precision cron expression.
    pub frequency: String,

    /// Only rows for jobs of this type are emitted, when set.
    #[serde(default)]
    pub job_type: Option<String>,

    /// Namespace of the downstream service that runs the `"email"` job type.
    pub downstream_service: String,

    /// Send an email even when zero rows were collected in the window.
    #[serde(default)]
    pub send_empty: bool,
}

/// The email template a report's `email` callback produces. The cron
/// aggregator fills in the first attachment's `content` with the
/// base64-encoded CSV before posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub from: String,
    pub to: EmailRecipient,
    pub subject: String,
    pub text: String,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecipient {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub content: String,
}

impl EmailTemplate {
    /// Validates `from`/`to` as RFC 5322 mailboxes before the template is
    /// ever handed to the downstream mail service. We don't send SMTP
    /// ourselves here, just reuse `lettre`'s address grammar to fail fast
    /// on a malformed report configuration.
    pub fn validate(&self) -> Result<()> {
        self.from
            .parse::<lettre::message::Mailbox>()
            .map_err(|e| Error::Config(format!("invalid report 'from' address: {e}")))?;
        format!("{} <{}>", self.to.name, self.to.email)
            .parse::<lettre::message::Mailbox>()
            .map_err(|e| Error::Config(format!("invalid report 'to' address: {e}")))?;
        Ok(())
    }

    pub fn with_csv_placeholder(
        from: impl Into<String>,
        to_name: impl Into<String>,
        to_email: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: EmailRecipient {
                name: to_name.into(),
                email: to_email.into(),
            },
            subject: subject.into(),
            text: text.into(),
            attachments: vec![EmailAttachment {
                filename: filename.into(),
                mime_type: "text/csv".to_string(),
                content: String::new(),
            }],
        }
    }
}
