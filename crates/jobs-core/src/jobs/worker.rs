//! The `Worker` trait workers implement, the error shape they return, and
//! the per-type registry entry the Service keeps.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::jobs::config::WorkerConfig;
use crate::jobs::context::JobContext;
use crate::jobs::job::Job;

/// The error shape a worker returns on failure. `kind` becomes the job's
/// `failKind` and drives typed-failure filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl WorkerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            stack: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Serialize into the `{name, message, stack, cause?}` form the finish
    /// procedure writes into a job's `result`.
    pub fn to_result(&self, name: &str) -> Value {
        serde_json::json!({
            "name": name,
            "message": self.message,
            "stack": self.stack,
        })
    }
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WorkerError {}

pub type WorkerResult = std::result::Result<Value, WorkerError>;

/// A registered job handler.
///
/// Implemented automatically for any
/// `Fn(Job, JobContext) -> impl Future<Output = WorkerResult> + Send + 'static`,
/// so callers can register plain async closures with `Service::on`.
pub trait Worker: Send + Sync {
    fn call(&self, job: Job, ctx: JobContext) -> BoxFuture<'static, WorkerResult>;
}

impl<F, Fut> Worker for F
where
    F: Fn(Job, JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = WorkerResult> + Send + 'static,
{
    fn call(&self, job: Job, ctx: JobContext) -> BoxFuture<'static, WorkerResult> {
        Box::pin(self(job, ctx))
    }
}

/// One entry in the Service's worker registry.
#[derive(Clone)]
pub struct WorkerEntry {
    pub work: Arc<dyn Worker>,
    pub config: WorkerConfig,
}

impl WorkerEntry {
    pub fn new(work: Arc<dyn Worker>, config: WorkerConfig) -> Self {
        Self { work, config }
    }
}
