//! Crate-wide error type.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the job lifecycle engine and report subsystem.
///
/// Variants map onto the error kinds a job can be filed under: most of
/// these end up serialized into a job's `result` rather than bubbling up
/// to the caller (see `Error::fail_kind`).
#[derive(Debug, Error)]
pub enum Error {
    /// No worker registered for a job's `type`. Filed as failure, kind "no-worker".
    #[error("no worker registered for job type: {0}")]
    NoWorker(String),

    /// Worker exceeded its configured timeout. Filed as failure, kind "timeout".
    #[error("job timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Job document failed shape validation after one retry.
    #[error("invalid job document: {0}")]
    Invalid(String),

    /// Worker returned an application error. `kind` is propagated as the job's `failKind`.
    #[error("worker failed: {message}")]
    WorkerFailure { message: String, kind: Option<String> },

    /// Store I/O error. Retried at the next observation unless encountered
    /// during `Queue::start`, where it is fatal to `start` only.
    #[error("store error: {0}")]
    StoreTransient(String),

    /// A finish reporter failed. Always logged, never propagated.
    #[error("finish reporter failed: {0}")]
    FinishReporterFailure(String),

    /// Configuration assembly or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Error::StoreTransient(msg.into())
    }

    /// Whether a retry at the next observation is expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreTransient(_) | Error::Http(_) | Error::WebSocket(_))
    }

    /// The `failKind` this error should file a job under, if any.
    pub fn fail_kind(&self) -> Option<&str> {
        match self {
            Error::NoWorker(_) => Some("no-worker"),
            Error::Timeout(_) => Some("timeout"),
            Error::WorkerFailure { kind, .. } => kind.as_deref(),
            _ => None,
        }
    }

    /// A category label suitable for metrics/logging.
    pub fn category(&self) -> &'static str {
        match self {
            Error::NoWorker(_) => "no-worker",
            Error::Timeout(_) => "timeout",
            Error::Invalid(_) => "invalid",
            Error::WorkerFailure { .. } => "worker-failure",
            Error::StoreTransient(_) => "store-transient",
            Error::FinishReporterFailure(_) => "finish-reporter",
            Error::Config(_) => "config",
            Error::Http(_) => "http",
            Error::WebSocket(_) => "websocket",
            Error::Json(_) => "json",
            Error::Io(_) => "io",
            Error::Csv(_) => "csv",
            Error::Other(_) => "other",
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e.to_string())
    }
}
