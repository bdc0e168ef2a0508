//! The job lifecycle engine: job records, worker registration, the
//! per-job Runner, the pending-list Queue, and the Service that wires them
//! together.

pub mod config;
pub mod context;
pub mod finish_reporter;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod runner;
pub mod service;
pub mod update_log;
pub mod worker;

pub use config::WorkerConfig;
pub use context::JobContext;
pub use finish_reporter::{FinishReporter, FinishReporterKind};
pub use job::{Job, JobStatus, JobUpdate};
pub use queue::Queue;
pub use runner::Runner;
pub use service::Service;
pub use update_log::UpdateLogger;
pub use worker::{Worker, WorkerEntry, WorkerError, WorkerResult};
