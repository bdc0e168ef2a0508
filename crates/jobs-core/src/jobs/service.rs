//! Owns the store client, worker registry, metrics, and reports; starts and
//! stops the Queue and every registered Report.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ServiceOptions;
use crate::error::{Error, Result};
use crate::jobs::config::WorkerConfig;
use crate::jobs::finish_reporter::FinishReporter;
use crate::jobs::metrics;
use crate::jobs::queue::Queue;
use crate::jobs::worker::{Worker, WorkerEntry};
use crate::report::{EmailBuilder, Report, ReportConfig};
use crate::store::{media_type, MediaType, StoreClient, Tree};

/// Shared context handed to every `Runner` and the `Queue`. `Service`
/// itself wraps one of these in an `Arc` so ownership fans out without a
/// `Rc`/`RefCell` cycle.
pub struct ServiceContext {
    pub name: String,
    pub store: Arc<dyn StoreClient>,
    pub workers: DashMap<String, WorkerEntry>,
    pub finish_reporters: Vec<FinishReporter>,
}

impl ServiceContext {
    pub fn new(name: String, store: Arc<dyn StoreClient>) -> Self {
        Self {
            name,
            store,
            workers: DashMap::new(),
            finish_reporters: Vec::new(),
        }
    }
}

/// The top-level handle an embedding process holds: register workers and
/// reports, then `start()`/`stop()`.
pub struct Service {
    ctx: Arc<ServiceContext>,
    concurrency: usize,
    skip_queue_on_startup: bool,
    reports: DashMap<String, Arc<Report>>,
    queue: tokio::sync::Mutex<Option<Queue>>,
    running: AtomicBool,
}

impl Service {
    pub fn new(name: impl Into<String>, store: Arc<dyn StoreClient>, concurrency: usize) -> Self {
        Self::with_options(name, store, concurrency, ServiceOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        store: Arc<dyn StoreClient>,
        concurrency: usize,
        opts: ServiceOptions,
    ) -> Self {
        let name = name.into();
        let mut ctx = ServiceContext::new(name, store);
        ctx.finish_reporters = opts.finish_reporters;
        Self {
            ctx: Arc::new(ctx),
            concurrency: concurrency.max(1),
            skip_queue_on_startup: opts.skip_queue_on_startup,
            reports: DashMap::new(),
            queue: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    pub fn store(&self) -> Arc<dyn StoreClient> {
        self.ctx.store.clone()
    }

    /// Register a worker for `job_type`. Idempotent replace.
    pub fn on(&self, job_type: impl Into<String>, config: WorkerConfig, work: Arc<dyn Worker>) {
        let job_type = job_type.into();
        metrics::register_worker_type(&self.ctx.name, &job_type);
        self.ctx
            .workers
            .insert(job_type.clone(), WorkerEntry::new(work, config));
        info!(job_type, service = %self.ctx.name, "worker registered");
    }

    pub fn off(&self, job_type: &str) {
        self.ctx.workers.remove(job_type);
        info!(job_type, service = %self.ctx.name, "worker removed");
    }

    pub fn get_worker(&self, job_type: &str) -> Result<WorkerEntry> {
        self.ctx
            .workers
            .get(job_type)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NoWorker(job_type.to_string()))
    }

    pub fn add_report(
        &self,
        name: impl Into<String>,
        config: ReportConfig,
        email: EmailBuilder,
    ) -> Arc<Report> {
        let name = name.into();
        let report = Arc::new(Report::new(name.clone(), self.ctx.clone(), config, email));
        self.reports.insert(name, report.clone());
        report
    }

    pub fn get_report(&self, name: &str) -> Option<Arc<Report>> {
        self.reports.get(name).map(|r| r.value().clone())
    }

    /// Starts the Queue, then every registered Report. Enforces at most one
    /// active Queue per Service.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::other("service already started"));
        }

        let services_root = Tree::new(media_type(MediaType::ServicesRoot));
        self.ctx
            .store
            .ensure("/bookmarks/services", &services_root)
            .await?;

        let mut queue = Queue::new(self.ctx.clone(), self.concurrency);
        if let Err(err) = queue.start(self.skip_queue_on_startup).await {
            self.running.store(false, Ordering::SeqCst);
            return Err(err);
        }
        *self.queue.lock().await = Some(queue);

        for report in self.reports.iter() {
            Arc::clone(report.value()).start().await?;
        }

        info!(service = %self.ctx.name, "service started");
        Ok(())
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(queue) = self.queue.lock().await.take() {
            queue.stop().await;
        }
        for report in self.reports.iter() {
            Arc::clone(report.value()).stop().await;
        }
        info!(service = %self.ctx.name, "service stopped");
    }

    /// Convenience: run until SIGINT/SIGTERM, then stop cleanly.
    pub async fn run_until_signal(&self) -> Result<()> {
        self.start().await?;
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(err) => warn!(%err, "failed to listen for shutdown signal"),
        }
        self.stop().await;
        Ok(())
    }
}
