//! Finish reporters: invoked after a job is filed, keyed by terminal status.
//!
//! Modeled as a closed tagged enum with a dispatch table rather than a
//! trait object hierarchy (contrast the teacher's `NotificationChannel`
//! trait, used for its open, pluggable channel set — this dispatch table is
//! intentionally closed and extended by adding a variant, not an impl).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::jobs::job::{Job, JobStatus};

/// The kind of side effect a finish reporter performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FinishReporterKind {
    /// POSTs `{blocks, attachments}` to a chat-channel webhook URL.
    ChatWebhook { url: String },
}

/// One configured reporter: which terminal status triggers it, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishReporter {
    pub target_status: JobStatus,
    #[serde(flatten)]
    pub kind: FinishReporterKind,
}

impl FinishReporter {
    pub fn chat_webhook(target_status: JobStatus, url: impl Into<String>) -> Self {
        Self {
            target_status,
            kind: FinishReporterKind::ChatWebhook { url: url.into() },
        }
    }

    /// Invoke this reporter for a finished job. Failures are logged and
    /// never propagated — filing has already happened by the time this runs.
    pub async fn dispatch(
        &self,
        job: &Job,
        filed_path: &str,
        job_id: &str,
        status: JobStatus,
    ) -> Result<()> {
        match &self.kind {
            FinishReporterKind::ChatWebhook { url } => {
                if url.trim().is_empty() {
                    error!(job_id, "chat webhook reporter missing url, skipping");
                    return Ok(());
                }
                dispatch_chat_webhook(url, job, filed_path, job_id, status).await
            }
        }
    }
}

async fn dispatch_chat_webhook(
    url: &str,
    job: &Job,
    filed_path: &str,
    job_id: &str,
    status: JobStatus,
) -> Result<()> {
    let text = format!(
        "job `{}` ({}) finished with status `{}`, filed at `{}`",
        job_id,
        job.job_type,
        status.as_path_segment(),
        filed_path
    );
    let payload = serde_json::json!({
        "blocks": [{"type": "section", "text": {"type": "mrkdwn", "text": text}}],
        "attachments": [{"blocks": [{"type": "section", "text": {"type": "mrkdwn", "text": serde_json::to_string(&job.result).unwrap_or_default()}}]}],
    });

    let client = reqwest::Client::new();
    let response = client
        .post(url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| Error::FinishReporterFailure(e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::FinishReporterFailure(format!(
            "chat webhook returned {}",
            response.status()
        )));
    }
    info!(job_id, url, "finish reporter dispatched");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_webhook_builder() {
        let reporter = FinishReporter::chat_webhook(JobStatus::Success, "https://hooks.example.com/x");
        assert_eq!(reporter.target_status, JobStatus::Success);
        match reporter.kind {
            FinishReporterKind::ChatWebhook { url } => assert_eq!(url, "https://hooks.example.com/x"),
        }
    }

    #[tokio::test]
    async fn missing_url_is_skipped_not_errored() {
        let reporter = FinishReporter::chat_webhook(JobStatus::Failure, "");
        let job = Job {
            id: "x".into(),
            service: "svc".into(),
            job_type: "demo".into(),
            config: Value::Null,
            status: Some(JobStatus::Failure),
            result: Value::Null,
            updates: Default::default(),
            is_job: true,
        };
        let result = reporter
            .dispatch(&job, "/path", "x", JobStatus::Failure)
            .await;
        assert!(result.is_ok());
    }
}
