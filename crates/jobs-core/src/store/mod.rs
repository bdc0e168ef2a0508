//! The store client abstraction: the only I/O seam between this crate and
//! the remote document store.
//!
//! Everything above this module — `Job`, `Runner`, `Queue`, `Report` — talks
//! to the store exclusively through the `StoreClient` trait so that the
//! entire job lifecycle engine can be exercised against `MockStoreClient`
//! without a network.

mod http;
mod mock;
pub mod paths;
pub mod watch;

pub use http::HttpStoreClient;
pub use mock::MockStoreClient;
pub use paths::{media_type, MediaType};
pub use watch::{ChangeBody, ChangeEvent, ChangeKind};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A document and the store revision it was read at.
#[derive(Debug, Clone)]
pub struct Document {
    pub data: Value,
    pub rev: Rev,
}

/// An opaque, monotonically increasing store revision.
///
/// The production store hands these out as strings (they may not be
/// numeric); treat them as opaque tokens for `watch`'s `from_rev`.
pub type Rev = String;

/// The location of a freshly created resource, returned by `post`.
#[derive(Debug, Clone)]
pub struct Location {
    pub path: String,
}

/// A live subscription handle returned by `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A tiny built-in template describing how to materialize an intermediate
/// container document. Not a general templating engine — see `paths`.
#[derive(Debug, Clone)]
pub struct Tree {
    pub media_type: &'static str,
}

impl Tree {
    pub fn new(media_type: &'static str) -> Self {
        Self { media_type }
    }
}

/// Capability set required by the job lifecycle engine and report
/// subsystem, over HTTP plus a WebSocket change feed.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Check existence without transferring a body.
    async fn head(&self, path: &str) -> Result<bool>;

    /// Fetch a document and the revision it was read at.
    async fn get(&self, path: &str) -> Result<Document>;

    /// Merge `data` into the document at `path`, creating it (and, when
    /// `tree` is given, any missing intermediate containers) if absent.
    async fn put(&self, path: &str, data: Value, tree: Option<&Tree>) -> Result<Rev>;

    /// Create a new resource under `path`, returning its location.
    async fn post(&self, path: &str, data: Value) -> Result<Location>;

    /// Remove the document or link at `path`.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Subscribe to incremental changes on `path`, optionally resuming from
    /// a previously observed revision.
    async fn watch(
        &self,
        path: &str,
        from_rev: Option<Rev>,
    ) -> Result<(SubscriptionId, watch::ChangeStream)>;

    /// Cancel a subscription previously returned by `watch`.
    async fn unwatch(&self, id: SubscriptionId) -> Result<()>;

    /// Idempotently ensure `path` exists, creating intermediate containers
    /// from `tree` without overwriting any existing content.
    async fn ensure(&self, path: &str, tree: &Tree) -> Result<()> {
        if self.head(path).await? {
            return Ok(());
        }
        self.put(path, serde_json::json!({}), Some(tree)).await?;
        Ok(())
    }
}
