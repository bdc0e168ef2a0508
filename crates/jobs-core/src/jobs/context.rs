//! Per-invocation handle passed to a worker.

use std::sync::Arc;

use crate::jobs::update_log::UpdateLogger;
use crate::store::StoreClient;

/// What a worker sees: its job's identifier, a store handle bound to this
/// service's credentials, and an update logger.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    pub store: Arc<dyn StoreClient>,
    pub updates: UpdateLogger,
}

impl JobContext {
    pub fn new(job_id: String, store: Arc<dyn StoreClient>, updates: UpdateLogger) -> Self {
        Self {
            job_id,
            store,
            updates,
        }
    }
}
