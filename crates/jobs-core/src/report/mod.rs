//! Per-job CSV row emission and cron-driven email aggregation.
//!
//! A `Report` watches a service's `success/day-index` and `failure/day-index`
//! lists, turning each newly filed job into one row under its own
//! `reports/<name>/day-index` bucket, and runs a cron timer that periodically
//! renders the accumulated rows to CSV and files an `"email"` job with the
//! downstream mail service.

pub mod config;
pub mod cron;
pub mod row;

pub use config::{EmailAttachment, EmailRecipient, EmailTemplate, ReportConfig};

use chrono::Utc;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::jobs::service::ServiceContext;
use crate::store::watch::ChangeKind;
use crate::store::{media_type, paths, MediaType, StoreClient, SubscriptionId, Tree};

/// Produces the email template for one aggregation run. The cron task fills
/// in the first attachment's `content` with the rendered CSV afterward.
pub type EmailBuilder = Arc<dyn Fn() -> EmailTemplate + Send + Sync>;

/// Optional predicate deciding whether a finished job gets a row at all.
pub type RowFilter = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportState {
    Idle,
    Running,
    Stopped,
}

struct Handles {
    success_watch: Option<JoinHandle<()>>,
    failure_watch: Option<JoinHandle<()>>,
    cron: Option<JoinHandle<()>>,
    subscriptions: Vec<SubscriptionId>,
}

pub struct Report {
    name: String,
    ctx: Arc<ServiceContext>,
    config: ReportConfig,
    email: EmailBuilder,
    filter: Option<RowFilter>,
    state: Mutex<ReportState>,
    stopping: Arc<AtomicBool>,
    handles: Mutex<Handles>,
}

impl Report {
    pub fn new(
        name: impl Into<String>,
        ctx: Arc<ServiceContext>,
        config: ReportConfig,
        email: EmailBuilder,
    ) -> Self {
        Self {
            name: name.into(),
            ctx,
            config,
            email,
            filter: None,
            state: Mutex::new(ReportState::Idle),
            stopping: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Handles {
                success_watch: None,
                failure_watch: None,
                cron: None,
                subscriptions: Vec::new(),
            }),
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Starts row-emission watches and the cron aggregator. `self: Arc<Self>`
    /// so the spawned tasks can outlive the caller's stack frame without a
    /// `Weak`/upgrade dance.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state != ReportState::Idle {
            return Err(crate::error::Error::other(format!(
                "report {} already started",
                self.name
            )));
        }
        *state = ReportState::Running;
        drop(state);

        let reports_root = paths::reports_root(&self.ctx.name);
        self.ctx
            .store
            .ensure(&reports_root, &Tree::new(media_type(MediaType::ReportsContainer)))
            .await?;

        let mut handles = self.handles.lock().await;

        let success_root = format!("{}/success/day-index", paths::jobs_root(&self.ctx.name));
        let (sub, handle) = self.clone().spawn_index_watch(success_root, true).await?;
        handles.subscriptions.push(sub);
        handles.success_watch = Some(handle);

        let failure_root = format!("{}/failure/day-index", paths::jobs_root(&self.ctx.name));
        let (sub, handle) = self.clone().spawn_index_watch(failure_root, false).await?;
        handles.subscriptions.push(sub);
        handles.failure_watch = Some(handle);

        handles.cron = Some(self.clone().spawn_cron_task());

        info!(report = %self.name, service = %self.ctx.name, "report started");
        Ok(())
    }

    pub async fn stop(self: Arc<Self>) {
        let mut state = self.state.lock().await;
        if *state != ReportState::Running {
            return;
        }
        *state = ReportState::Stopped;
        drop(state);

        self.stopping.store(true, Ordering::SeqCst);
        let mut handles = self.handles.lock().await;
        for sub in handles.subscriptions.drain(..) {
            let _ = self.ctx.store.unwatch(sub).await;
        }
        if let Some(h) = handles.success_watch.take() {
            h.abort();
        }
        if let Some(h) = handles.failure_watch.take() {
            h.abort();
        }
        if let Some(h) = handles.cron.take() {
            h.abort();
        }
        info!(report = %self.name, "report stopped");
    }

    async fn spawn_index_watch(
        self: Arc<Self>,
        index_root: String,
        is_success: bool,
    ) -> Result<(SubscriptionId, JoinHandle<()>)> {
        self.ctx
            .store
            .ensure(&index_root, &Tree::new(media_type(MediaType::DayBucket)))
            .await
            .ok();
        let doc = self.ctx.store.get(&index_root).await?;
        let (sub_id, mut stream) = self.ctx.store.watch(&index_root, Some(doc.rev.clone())).await?;

        let report = self.clone();
        let handle = tokio::spawn(async move {
            report.process_index_body(doc.data, is_success).await;
            loop {
                match stream.recv().await {
                    Some(event) => {
                        if event.change.kind != ChangeKind::Merge {
                            continue;
                        }
                        report.process_index_body(event.change.body, is_success).await;
                    }
                    None => {
                        if !report.stopping.load(Ordering::SeqCst) {
                            error!(report = %report.name, "day-index subscription collapsed unexpectedly");
                        }
                        break;
                    }
                }
            }
        });

        Ok((sub_id, handle))
    }

    async fn process_index_body(&self, body: serde_json::Value, is_success: bool) {
        let Some(days) = body.as_object() else {
            return;
        };
        for (day, entries) in days {
            let Some(entries) = entries.as_object() else {
                continue;
            };
            for (job_key, link) in entries {
                let Some(job_path) = link.get("_id").and_then(|v| v.as_str()) else {
                    continue;
                };
                if let Err(err) = self.emit_row(day, job_key, job_path, link, is_success).await {
                    warn!(%err, job_key, "failed to emit report row");
                }
            }
        }
    }

    async fn emit_row(
        &self,
        day: &str,
        job_key: &str,
        job_path: &str,
        link: &serde_json::Value,
        is_success: bool,
    ) -> Result<()> {
        let job_doc = self.ctx.store.get(job_path).await?.data;

        if let Some(expected_type) = &self.config.job_type {
            if job_doc.get("type").and_then(|v| v.as_str()) != Some(expected_type.as_str()) {
                return Ok(());
            }
        }
        if let Some(filter) = &self.filter {
            if !filter(&job_doc) {
                return Ok(());
            }
        }

        let fail_kind = link.get("failKind").and_then(|v| v.as_str());
        let row = row::build_row(&job_doc, fail_kind, is_success, &self.config);

        let bucket_tree = Tree::new(media_type(MediaType::Report));
        let index_path = paths::report_day_index(&self.ctx.name, &self.name, day);
        self.ctx.store.ensure(&index_path, &bucket_tree).await?;
        let row_path = paths::report_row(&self.ctx.name, &self.name, day, job_key);
        self.ctx.store.put(&row_path, row, None).await?;
        debug!(report = %self.name, job_key, "row emitted");
        Ok(())
    }

    fn spawn_cron_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let schedule = match ::cron::Schedule::from_str(&self.config.frequency) {
                Ok(s) => s,
                Err(err) => {
                    error!(report = %self.name, %err, "invalid cron expression, aggregator disabled");
                    return;
                }
            };

            let mut last_cron = Utc::now();
            loop {
                if self.stopping.load(Ordering::SeqCst) {
                    break;
                }
                let now = Utc::now();
                let next = schedule
                    .after(&now)
                    .next()
                    .unwrap_or_else(|| now + chrono::Duration::hours(1));
                let sleep_for = (next - now).to_std().unwrap_or(std::time::Duration::from_secs(1));
                tokio::time::sleep(sleep_for).await;

                if self.stopping.load(Ordering::SeqCst) {
                    break;
                }

                if let Err(err) = self.run_aggregation(last_cron, next).await {
                    error!(report = %self.name, %err, "report aggregation failed");
                }
                last_cron = next;
            }
        })
    }

    async fn run_aggregation(
        &self,
        window_start: chrono::DateTime<Utc>,
        window_end: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = Vec::new();
        for day in cron::days_overlapping(window_start, window_end) {
            rows.extend(
                cron::read_day_rows(self.ctx.store.as_ref(), &self.ctx.name, &self.name, day).await?,
            );
        }

        if rows.is_empty() && !self.config.send_empty {
            debug!(report = %self.name, "no rows in window, skipping email");
            return Ok(());
        }

        let csv_bytes = cron::render_csv(&rows, &self.config)?;
        let template = (self.email)();
        cron::submit_email_job(
            self.ctx.store.as_ref(),
            &self.config.downstream_service,
            template,
            &csv_bytes,
        )
        .await?;
        info!(report = %self.name, rows = rows.len(), "report email submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::service::ServiceContext;
    use crate::report::config::{EmailRecipient, EmailAttachment};
    use crate::store::MockStoreClient;
    use std::time::Duration;

    fn test_config() -> ReportConfig {
        ReportConfig {
            job_mappings: vec![
                ("id".to_string(), "/_id".to_string()),
                ("outcome".to_string(), "errorMappings".to_string()),
            ],
            error_mappings: Default::default(),
            frequency: "0 0 * * * * *".to_string(),
            job_type: None,
            downstream_service: "email-service".to_string(),
            send_empty: false,
        }
    }

    fn test_email() -> EmailTemplate {
        EmailTemplate {
            from: "jobs@example.com".to_string(),
            to: EmailRecipient {
                name: "Ops".to_string(),
                email: "ops@example.com".to_string(),
            },
            subject: "Daily report".to_string(),
            text: "see attached".to_string(),
            attachments: vec![EmailAttachment {
                filename: "report.csv".to_string(),
                mime_type: "text/csv".to_string(),
                content: String::new(),
            }],
        }
    }

    #[tokio::test]
    async fn start_then_stop_is_idempotent_and_clean() {
        let store = Arc::new(MockStoreClient::new());
        let ctx = Arc::new(ServiceContext::new("svc".to_string(), store));
        let email: EmailBuilder = Arc::new(test_email);
        let report = Arc::new(Report::new("daily", ctx, test_config(), email));

        report.clone().start().await.unwrap();
        assert!(report.clone().start().await.is_err());
        report.clone().stop().await;
    }

    #[tokio::test]
    async fn success_row_is_emitted_from_day_index_change() {
        let store = Arc::new(MockStoreClient::new());
        let ctx = Arc::new(ServiceContext::new("svc".to_string(), store.clone()));
        let email: EmailBuilder = Arc::new(test_email);
        let report = Arc::new(Report::new("daily", ctx, test_config(), email));
        report.clone().start().await.unwrap();

        store
            .put("/resources/1", serde_json::json!({"service": "svc", "type": "demo"}), None)
            .await
            .unwrap();
        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
        store
            .put(
                &format!("/bookmarks/services/svc/jobs/success/day-index/{day}/k1"),
                serde_json::json!({"_id": "/resources/1"}),
                None,
            )
            .await
            .unwrap();

        let row_path = format!("/bookmarks/services/svc/jobs/reports/daily/day-index/{day}/k1");
        for _ in 0..50 {
            if store.head(&row_path).await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let row = store.get(&row_path).await.unwrap();
        assert_eq!(row.data["outcome"], "Success");

        report.stop().await;
    }
}
