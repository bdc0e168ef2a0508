//! Drives exactly one job to a terminal state: invoke, time-bound, finish.

use serde_json::Value;
use std::time::Instant;
use tracing::{error, warn};

use crate::error::Result;
use crate::jobs::context::JobContext;
use crate::jobs::job::{Job, JobStatus};
use crate::jobs::metrics;
use crate::jobs::service::ServiceContext;
use crate::jobs::update_log::UpdateLogger;
use crate::store::{media_type, paths, MediaType, Tree};
use std::sync::Arc;

pub struct Runner {
    ctx: Arc<ServiceContext>,
    job_key: String,
    job_path: String,
}

impl Runner {
    pub fn new(ctx: Arc<ServiceContext>, job_key: String, job_path: String) -> Self {
        Self {
            ctx,
            job_key,
            job_path,
        }
    }

    /// Drives the job to a terminal state. Errors are logged, not
    /// propagated: leaving the pending entry in place is itself the retry
    /// mechanism for store failures encountered along the way.
    pub async fn run(self) {
        if let Err(err) = self.run_inner().await {
            error!(
                job = %self.job_path,
                %err,
                "runner failed before filing completed; pending entry left for retry"
            );
        }
    }

    async fn run_inner(&self) -> Result<()> {
        let job = Job::load(self.ctx.store.as_ref(), &self.job_path).await?;

        if !job.is_job {
            warn!(job = %self.job_path, "pending entry did not resolve to a valid job document");
            return self
                .finish(&job, JobStatus::Failure, Value::Null, chrono::Utc::now(), None)
                .await;
        }

        if let Some(status) = job.status {
            if status != JobStatus::Pending {
                let marker = match status {
                    JobStatus::Success => "success",
                    _ => "failure",
                };
                let time = job
                    .last_update_matching(marker)
                    .and_then(|u| chrono::DateTime::parse_from_rfc3339(&u.time).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(chrono::Utc::now);
                return self
                    .finish(&job, status, Value::Object(Default::default()), time, None)
                    .await;
            }
        }

        let Some(entry) = self.ctx.workers.get(&job.job_type).map(|e| e.value().clone()) else {
            warn!(job_type = %job.job_type, job = %self.job_path, "no worker registered");
            let result = serde_json::json!({
                "name": "NoWorkerError",
                "message": format!("no worker registered for job type: {}", job.job_type),
            });
            return self
                .finish(&job, JobStatus::Failure, result, chrono::Utc::now(), Some("no-worker"))
                .await;
        };

        metrics::inc_queued(&self.ctx.name, &job.job_type);

        let updates = UpdateLogger::new(
            self.ctx.store.clone(),
            self.job_path.clone(),
            entry.config.enable_debug_updates,
            entry.config.enable_trace_updates,
        );
        let _ = updates.info("started", serde_json::json!("Runner started")).await;

        let job_ctx = JobContext::new(self.job_path.clone(), self.ctx.store.clone(), updates);
        let work = entry.work.clone();
        let job_for_worker = job.clone();

        metrics::dec_queued(&self.ctx.name, &job.job_type);
        metrics::inc_running(&self.ctx.name, &job.job_type);

        let start = Instant::now();
        let handle = tokio::spawn(async move { work.call(job_for_worker, job_ctx).await });
        let abort_handle = handle.abort_handle();
        let timeout = entry.config.timeout();
        let outcome = tokio::time::timeout(timeout, handle).await;
        if outcome.is_err() {
            abort_handle.abort();
        }

        metrics::dec_running(&self.ctx.name, &job.job_type);
        let finish_time = chrono::Utc::now();

        match outcome {
            Ok(Ok(Ok(value))) => {
                metrics::observe_job_time(&self.ctx.name, &job.job_type, "success", start.elapsed());
                self.finish(&job, JobStatus::Success, value, finish_time, None).await
            }
            Ok(Ok(Err(worker_err))) => {
                metrics::observe_job_time(&self.ctx.name, &job.job_type, "failure", start.elapsed());
                let fail_kind = worker_err.kind.clone();
                let result = worker_err.to_result("WorkerError");
                self.finish(&job, JobStatus::Failure, result, finish_time, fail_kind.as_deref())
                    .await
            }
            Ok(Err(join_err)) => {
                metrics::observe_job_time(&self.ctx.name, &job.job_type, "failure", start.elapsed());
                let result = serde_json::json!({
                    "name": "PanicError",
                    "message": join_err.to_string(),
                });
                self.finish(&job, JobStatus::Failure, result, finish_time, None).await
            }
            Err(_elapsed) => {
                metrics::observe_job_time(&self.ctx.name, &job.job_type, "failure", start.elapsed());
                let result = serde_json::json!({
                    "name": "TimeoutError",
                    "message": format!("job timed out after {:?}", timeout),
                });
                self.finish(&job, JobStatus::Failure, result, finish_time, Some("timeout"))
                    .await
            }
        }
    }

    /// The critical path: §4.3.2. Idempotent in its filing steps; only
    /// rewrites `{status, result}` when the document is not already at the
    /// target terminal status, so a re-observed-terminal short-circuit
    /// never clobbers a previously stored result.
    async fn finish(
        &self,
        job: &Job,
        status: JobStatus,
        result: Value,
        time: chrono::DateTime<chrono::Utc>,
        fail_kind: Option<&str>,
    ) -> Result<()> {
        let store = self.ctx.store.as_ref();
        let already_terminal = job.status == Some(status);

        if !already_terminal {
            store
                .put(
                    &self.job_path,
                    serde_json::json!({"status": status.as_path_segment(), "result": result}),
                    None,
                )
                .await?;
        }

        let updates = UpdateLogger::new(self.ctx.store.clone(), self.job_path.clone(), true, true);
        let _ = updates
            .info(status.as_path_segment(), serde_json::json!("Runner finished"))
            .await;

        let day = time.format("%Y-%m-%d").to_string();
        let bucket_tree = Tree::new(media_type(MediaType::DayBucket));

        let day_index = paths::day_index(&self.ctx.name, status.as_path_segment(), &day);
        store.ensure(&day_index, &bucket_tree).await?;
        let filed_path = paths::filed_entry(&self.ctx.name, status.as_path_segment(), &day, &self.job_key);
        store
            .put(
                &filed_path,
                serde_json::json!({"_id": self.job_path, "failKind": fail_kind}),
                None,
            )
            .await?;

        if status == JobStatus::Failure {
            if let Some(kind) = fail_kind {
                let typed_index = paths::typed_failure_day_index(&self.ctx.name, kind, &day);
                store.ensure(&typed_index, &bucket_tree).await?;
                let typed_entry =
                    paths::typed_failure_entry(&self.ctx.name, kind, &day, &self.job_key);
                store
                    .put(&typed_entry, serde_json::json!({"_id": self.job_path}), None)
                    .await?;
            }
        }

        store
            .delete(&paths::pending_entry(&self.ctx.name, &self.job_key))
            .await?;

        metrics::inc_terminal(&self.ctx.name, &job.job_type, status.as_path_segment());

        for reporter in self.ctx.finish_reporters.iter() {
            if reporter.target_status != status {
                continue;
            }
            let mut final_job = job.clone();
            final_job.status = Some(status);
            if let Err(err) = reporter
                .dispatch(&final_job, &filed_path, &self.job_path, status)
                .await
            {
                error!(%err, "finish reporter failed");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::config::WorkerConfig;
    use crate::jobs::service::ServiceContext;
    use crate::jobs::worker::{Worker, WorkerEntry, WorkerError};
    use crate::store::MockStoreClient;
    use std::time::Duration;

    fn ctx_with_worker(work: Arc<dyn Worker>, timeout: Duration) -> Arc<ServiceContext> {
        let store = Arc::new(MockStoreClient::new());
        let ctx = ServiceContext::new("svc".to_string(), store);
        ctx.workers.insert(
            "demo".to_string(),
            WorkerEntry::new(work, WorkerConfig::new(timeout)),
        );
        Arc::new(ctx)
    }

    #[tokio::test]
    async fn success_files_under_success_day_index() {
        let work: Arc<dyn Worker> = Arc::new(|_job: Job, _ctx: JobContext| async move {
            Ok(serde_json::json!({"ok": true}))
        });
        let ctx = ctx_with_worker(work, Duration::from_secs(5));
        ctx.store
            .put(
                "/resources/1",
                serde_json::json!({"service": "svc", "type": "demo", "config": {}}),
                None,
            )
            .await
            .unwrap();
        let runner = Runner::new(ctx.clone(), "k1".into(), "/resources/1".into());
        runner.run().await;

        let job_doc = ctx.store.get("/resources/1").await.unwrap();
        assert_eq!(job_doc.data["status"], "success");
        assert_eq!(job_doc.data["result"], serde_json::json!({"ok": true}));
        assert!(ctx.store.head(&format!(
            "/bookmarks/services/svc/jobs/success/day-index/{}/k1",
            chrono::Utc::now().format("%Y-%m-%d")
        )).await.unwrap());
        assert!(!ctx.store.head("/bookmarks/services/svc/jobs/pending/k1").await.unwrap());
    }

    #[tokio::test]
    async fn no_worker_files_as_failure_with_kind() {
        let work: Arc<dyn Worker> =
            Arc::new(|_job: Job, _ctx: JobContext| async move { Ok(Value::Null) });
        let ctx = ctx_with_worker(work, Duration::from_secs(5));
        ctx.store
            .put(
                "/resources/1",
                serde_json::json!({"service": "svc", "type": "unregistered", "config": {}}),
                None,
            )
            .await
            .unwrap();
        let runner = Runner::new(ctx.clone(), "k1".into(), "/resources/1".into());
        runner.run().await;

        let job_doc = ctx.store.get("/resources/1").await.unwrap();
        assert_eq!(job_doc.data["status"], "failure");
        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
        assert!(ctx
            .store
            .head(&format!(
                "/bookmarks/services/svc/jobs/typed-failure/no-worker/day-index/{day}/k1"
            ))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn worker_error_round_trips_message() {
        let work: Arc<dyn Worker> = Arc::new(|_job: Job, _ctx: JobContext| async move {
            Err(WorkerError::new("boom").with_kind("custom"))
        });
        let ctx = ctx_with_worker(work, Duration::from_secs(5));
        ctx.store
            .put(
                "/resources/1",
                serde_json::json!({"service": "svc", "type": "demo", "config": {}}),
                None,
            )
            .await
            .unwrap();
        let runner = Runner::new(ctx.clone(), "k1".into(), "/resources/1".into());
        runner.run().await;

        let job_doc = ctx.store.get("/resources/1").await.unwrap();
        assert_eq!(job_doc.data["status"], "failure");
        assert_eq!(job_doc.data["result"]["message"], "boom");
    }

    #[tokio::test]
    async fn timeout_fails_with_timeout_kind() {
        let work: Arc<dyn Worker> = Arc::new(|_job: Job, _ctx: JobContext| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        });
        let ctx = ctx_with_worker(work, Duration::from_millis(20));
        ctx.store
            .put(
                "/resources/1",
                serde_json::json!({"service": "svc", "type": "demo", "config": {}}),
                None,
            )
            .await
            .unwrap();
        let runner = Runner::new(ctx.clone(), "k1".into(), "/resources/1".into());
        runner.run().await;

        let job_doc = ctx.store.get("/resources/1").await.unwrap();
        assert_eq!(job_doc.data["status"], "failure");
        assert_eq!(job_doc.data["result"]["name"], "TimeoutError");
    }

    #[tokio::test]
    async fn invalid_job_files_as_failure_with_empty_result() {
        let work: Arc<dyn Worker> =
            Arc::new(|_job: Job, _ctx: JobContext| async move { Ok(Value::Null) });
        let ctx = ctx_with_worker(work, Duration::from_secs(5));
        ctx.store.put("/resources/1", serde_json::json!({}), None).await.unwrap();
        let runner = Runner::new(ctx.clone(), "k1".into(), "/resources/1".into());
        runner.run().await;

        let job_doc = ctx.store.get("/resources/1").await.unwrap();
        assert_eq!(job_doc.data["status"], "failure");
        assert_eq!(job_doc.data["result"], Value::Null);
    }

    #[tokio::test]
    async fn short_circuit_on_already_terminal_does_not_overwrite_result() {
        let work: Arc<dyn Worker> =
            Arc::new(|_job: Job, _ctx: JobContext| async move { Ok(Value::Null) });
        let ctx = ctx_with_worker(work, Duration::from_secs(5));
        ctx.store
            .put(
                "/resources/1",
                serde_json::json!({
                    "service": "svc", "type": "demo", "config": {},
                    "status": "success", "result": {"already": "done"},
                }),
                None,
            )
            .await
            .unwrap();
        let runner = Runner::new(ctx.clone(), "k1".into(), "/resources/1".into());
        runner.run().await;

        let job_doc = ctx.store.get("/resources/1").await.unwrap();
        assert_eq!(job_doc.data["result"], serde_json::json!({"already": "done"}));
    }
}
