//! Job lifecycle engine: discovery, bounded-concurrency dispatch,
//! timeout-enforced execution, idempotent filing, and report aggregation,
//! all speaking to a remote document store through the `StoreClient` seam.

pub mod config;
pub mod error;
pub mod jobs;
pub mod report;
pub mod store;

pub use config::{ServiceConfig, ServiceOptions, StoreConfig};
pub use error::{Error, Result};
pub use jobs::{
    FinishReporter, FinishReporterKind, Job, JobContext, JobStatus, JobUpdate, Queue, Runner,
    Service, UpdateLogger, Worker, WorkerConfig, WorkerEntry, WorkerError, WorkerResult,
};
pub use report::{EmailBuilder, Report, ReportConfig, RowFilter};
pub use store::{
    ChangeBody, ChangeEvent, ChangeKind, Document, HttpStoreClient, Location, MediaType,
    MockStoreClient, Rev, StoreClient, SubscriptionId, Tree,
};

/// Current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
