//! Appends timestamped progress entries to a job's `updates` mapping.
//!
//! Four levels: `info` and `error` always post; `debug` and `trace` post
//! only when enabled for the worker type. Update keys are ULIDs, which sort
//! lexicographically in creation order with no side index required.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug as trace_debug, trace as trace_trace};
use ulid::Ulid;

use crate::error::Result;
use crate::store::StoreClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    Info,
    Debug,
    Trace,
    Error,
}

/// Posts one update per call to a specific job's `updates` map.
#[derive(Clone)]
pub struct UpdateLogger {
    store: Option<Arc<dyn StoreClient>>,
    job_id: String,
    debug_enabled: bool,
    trace_enabled: bool,
}

impl UpdateLogger {
    pub fn new(
        store: Arc<dyn StoreClient>,
        job_id: String,
        debug_enabled: bool,
        trace_enabled: bool,
    ) -> Self {
        Self {
            store: Some(store),
            job_id,
            debug_enabled,
            trace_enabled,
        }
    }

    /// A no-op logger, useful for tests that don't care about update posts.
    pub fn disabled() -> Self {
        Self {
            store: None,
            job_id: String::new(),
            debug_enabled: false,
            trace_enabled: false,
        }
    }

    pub async fn info(&self, status: impl Into<String>, meta: Value) -> Result<()> {
        self.post(Level::Info, status.into(), meta).await
    }

    pub async fn error(&self, status: impl Into<String>, meta: Value) -> Result<()> {
        self.post(Level::Error, status.into(), meta).await
    }

    pub async fn debug(&self, status: impl Into<String>, meta: Value) -> Result<()> {
        if !self.debug_enabled {
            return Ok(());
        }
        self.post(Level::Debug, status.into(), meta).await
    }

    pub async fn trace(&self, status: impl Into<String>, meta: Value) -> Result<()> {
        if !self.trace_enabled {
            return Ok(());
        }
        self.post(Level::Trace, status.into(), meta).await
    }

    async fn post(&self, level: Level, status: String, meta: Value) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let key = Ulid::new().to_string();
        let time = chrono::Utc::now().to_rfc3339();
        let path = format!("{}/updates/{}", self.job_id, key);
        let body = serde_json::json!({ "status": status, "time": time, "meta": meta });

        match level {
            Level::Debug => trace_debug!(job = %self.job_id, %status, "update"),
            Level::Trace => trace_trace!(job = %self.job_id, %status, "update"),
            _ => {}
        }

        store.put(&path, body, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStoreClient;

    #[tokio::test]
    async fn info_and_error_always_post() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let logger = UpdateLogger::new(store.clone(), "/resources/1".into(), false, false);
        logger.info("started", Value::Null).await.unwrap();
        logger.error("failed", Value::Null).await.unwrap();
        let doc = store.get("/resources/1").await.unwrap();
        let updates = doc.data.get("updates").unwrap().as_object().unwrap();
        assert_eq!(updates.len(), 2);
    }

    #[tokio::test]
    async fn debug_suppressed_when_disabled() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let logger = UpdateLogger::new(store.clone(), "/resources/1".into(), false, false);
        logger.debug("probing", Value::Null).await.unwrap();
        assert!(store.get("/resources/1").await.is_err());
    }

    #[tokio::test]
    async fn debug_posts_when_enabled() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let logger = UpdateLogger::new(store.clone(), "/resources/1".into(), true, false);
        logger.debug("probing", Value::Null).await.unwrap();
        let doc = store.get("/resources/1").await.unwrap();
        assert_eq!(doc.data.get("updates").unwrap().as_object().unwrap().len(), 1);
    }
}
