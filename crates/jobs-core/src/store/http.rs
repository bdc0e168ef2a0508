//! Production `StoreClient`: plain requests over a pooled `reqwest::Client`,
//! change subscriptions multiplexed onto one `tokio-tungstenite` connection.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::watch::{ChangeStream, WatchHub};
use crate::store::{Document, Location, Rev, StoreClient, SubscriptionId, Tree};

/// Speaks HTTP plus a WebSocket change feed to the store.
pub struct HttpStoreClient {
    domain: String,
    token: String,
    client: reqwest::Client,
    hub: Arc<WatchHub>,
    next_sub_id: AtomicU64,
}

impl HttpStoreClient {
    pub fn new(domain: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_timeout(domain, token, std::time::Duration::from_secs(30))
    }

    pub fn with_timeout(
        domain: impl Into<String>,
        token: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder should not fail with static config");
        Self {
            domain: domain.into(),
            token: token.into(),
            client,
            hub: Arc::new(WatchHub::new()),
            next_sub_id: AtomicU64::new(1),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.domain.trim_end_matches('/'), path)
    }

    fn ws_url(&self) -> String {
        let http_url = self.domain.trim_end_matches('/');
        if let Some(rest) = http_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = http_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            http_url.to_string()
        }
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn head(&self, path: &str) -> Result<bool> {
        let response = self
            .client
            .head(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn get(&self, path: &str) -> Result<Document> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::store(format!(
                "GET {path} failed: {}",
                response.status()
            )));
        }
        let rev = response
            .headers()
            .get("x-oada-rev")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("0")
            .to_string();
        let data: Value = response.json().await?;
        Ok(Document { data, rev })
    }

    async fn put(&self, path: &str, data: Value, tree: Option<&Tree>) -> Result<Rev> {
        let mut request = self
            .client
            .put(self.url(path))
            .bearer_auth(&self.token)
            .json(&data);
        if let Some(tree) = tree {
            request = request.header("content-type", tree.media_type);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::store(format!(
                "PUT {path} failed: {}",
                response.status()
            )));
        }
        let rev = response
            .headers()
            .get("x-oada-rev")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("0")
            .to_string();
        Ok(rev)
    }

    async fn post(&self, path: &str, data: Value) -> Result<Location> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(&data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::store(format!(
                "POST {path} failed: {}",
                response.status()
            )));
        }
        let location = response
            .headers()
            .get("content-location")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(path)
            .to_string();
        Ok(Location { path: location })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(Error::store(format!(
                "DELETE {path} failed: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn watch(
        &self,
        path: &str,
        from_rev: Option<Rev>,
    ) -> Result<(SubscriptionId, ChangeStream)> {
        let id = SubscriptionId(self.next_sub_id.fetch_add(1, Ordering::SeqCst));
        debug!(path, ?from_rev, sub_id = id.0, "subscribing to change feed");
        self.hub
            .subscribe(self.ws_url(), &self.token, id, path, from_rev)
            .await
    }

    async fn unwatch(&self, id: SubscriptionId) -> Result<()> {
        self.hub.unsubscribe(id).await;
        Ok(())
    }
}

impl Drop for HttpStoreClient {
    fn drop(&mut self) {
        warn!("HttpStoreClient dropped; open subscriptions will be closed with it");
    }
}
