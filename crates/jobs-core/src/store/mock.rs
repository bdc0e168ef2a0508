//! In-memory `StoreClient` used by every test in this crate.
//!
//! Holds the whole document tree behind one `tokio::sync::RwLock` and fans
//! out changes to live `watch()` subscribers via per-subscription
//! `tokio::sync::mpsc` channels, keyed by the watched path's ancestor
//! relationship to the write.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};

use crate::error::{Error, Result};
use crate::store::watch::{ChangeBody, ChangeEvent, ChangeKind, ChangeStream};
use crate::store::{Document, Location, Rev, StoreClient, SubscriptionId, Tree};

struct Subscription {
    path: String,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

/// In-memory stand-in for the production store.
pub struct MockStoreClient {
    tree: RwLock<Value>,
    subscriptions: DashMap<u64, Subscription>,
    next_sub_id: AtomicU64,
    rev: AtomicU64,
    next_resource_id: AtomicU64,
}

impl MockStoreClient {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Value::Object(Map::new())),
            subscriptions: DashMap::new(),
            next_sub_id: AtomicU64::new(1),
            rev: AtomicU64::new(0),
            next_resource_id: AtomicU64::new(1),
        }
    }

    /// Test convenience: seed a path directly without going through `put`'s
    /// change-notification machinery.
    pub async fn seed(&self, path: &str, data: Value) {
        let mut tree = self.tree.write().await;
        *navigate_create(&mut tree, path) = data;
    }

    /// Test convenience: read a path back without the `Document` wrapper.
    pub async fn peek(&self, path: &str) -> Option<Value> {
        let tree = self.tree.read().await;
        navigate(&tree, path).cloned()
    }

    fn bump_rev(&self) -> Rev {
        self.rev.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn notify(&self, changed_path: &str, value: &Value, kind: ChangeKind) {
        let changed_segments = segments(changed_path);
        for entry in self.subscriptions.iter() {
            let watched_segments = segments(&entry.path);
            if changed_segments.len() < watched_segments.len() {
                continue;
            }
            if changed_segments[..watched_segments.len()] != watched_segments[..] {
                continue;
            }
            let remainder = &changed_segments[watched_segments.len()..];
            let body = nest(remainder, value.clone());
            let event = ChangeEvent {
                change: ChangeBody { kind, body },
                rev: self.rev.load(Ordering::SeqCst).to_string(),
            };
            let _ = entry.sender.send(event);
        }
    }
}

impl Default for MockStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn nest(remainder: &[&str], value: Value) -> Value {
    match remainder.split_first() {
        None => value,
        Some((head, rest)) => {
            let mut map = Map::new();
            map.insert((*head).to_string(), nest(rest, value));
            Value::Object(map)
        }
    }
}

fn navigate<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments(path) {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn navigate_create<'a>(root: &'a mut Value, path: &str) -> &'a mut Value {
    let mut current = root;
    for segment in segments(path) {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("just coerced to object");
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    current
}

fn merge(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(existing_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                merge(
                    existing_map.entry(key).or_insert(Value::Null),
                    value,
                );
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn head(&self, path: &str) -> Result<bool> {
        let tree = self.tree.read().await;
        Ok(navigate(&tree, path).is_some())
    }

    async fn get(&self, path: &str) -> Result<Document> {
        let tree = self.tree.read().await;
        let data = navigate(&tree, path)
            .cloned()
            .ok_or_else(|| Error::store(format!("not found: {path}")))?;
        Ok(Document {
            data,
            rev: self.rev.load(Ordering::SeqCst).to_string(),
        })
    }

    async fn put(&self, path: &str, data: Value, _tree: Option<&Tree>) -> Result<Rev> {
        {
            let mut tree = self.tree.write().await;
            let slot = navigate_create(&mut tree, path);
            merge(slot, data.clone());
        }
        let rev = self.bump_rev();
        self.notify(path, &data, ChangeKind::Merge);
        Ok(rev)
    }

    async fn post(&self, path: &str, data: Value) -> Result<Location> {
        let id = self.next_resource_id.fetch_add(1, Ordering::SeqCst);
        let resource_path = format!("/resources/{id}");
        {
            let mut tree = self.tree.write().await;
            *navigate_create(&mut tree, &resource_path) = data;
        }
        self.bump_rev();
        let _ = path;
        Ok(Location {
            path: resource_path,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let segs = segments(path);
        let Some((leaf, parents)) = segs.split_last() else {
            return Ok(());
        };
        {
            let mut tree = self.tree.write().await;
            let mut current = &mut *tree;
            for segment in parents {
                match current.as_object_mut().and_then(|m| m.get_mut(*segment)) {
                    Some(next) => current = next,
                    None => return Ok(()),
                }
            }
            if let Some(map) = current.as_object_mut() {
                map.remove(*leaf);
            }
        }
        self.bump_rev();
        self.notify(path, &Value::Null, ChangeKind::Delete);
        Ok(())
    }

    async fn watch(
        &self,
        path: &str,
        _from_rev: Option<Rev>,
    ) -> Result<(SubscriptionId, ChangeStream)> {
        let id = SubscriptionId(self.next_sub_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscriptions.insert(
            id.0,
            Subscription {
                path: path.to_string(),
                sender,
            },
        );
        Ok((id, receiver))
    }

    async fn unwatch(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.remove(&id.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MockStoreClient::new();
        store
            .put("/a/b", serde_json::json!({"x": 1}), None)
            .await
            .unwrap();
        let doc = store.get("/a/b").await.unwrap();
        assert_eq!(doc.data, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn watch_sees_nested_merge_one_level_down() {
        let store = MockStoreClient::new();
        let (_id, mut stream) = store.watch("/a/pending", None).await.unwrap();
        store
            .put("/a/pending/job1", serde_json::json!({"_id": "x"}), None)
            .await
            .unwrap();
        let event = stream.recv().await.unwrap();
        assert_eq!(
            event.change.body,
            serde_json::json!({"job1": {"_id": "x"}})
        );
    }

    #[tokio::test]
    async fn watch_sees_nested_merge_two_levels_down() {
        let store = MockStoreClient::new();
        let (_id, mut stream) = store.watch("/a/success/day-index", None).await.unwrap();
        store
            .put(
                "/a/success/day-index/2024-01-01/job1",
                serde_json::json!({"_id": "r1"}),
                None,
            )
            .await
            .unwrap();
        let event = stream.recv().await.unwrap();
        assert_eq!(
            event.change.body,
            serde_json::json!({"2024-01-01": {"job1": {"_id": "r1"}}})
        );
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = MockStoreClient::new();
        store
            .put("/a/b", serde_json::json!({"x": 1}), None)
            .await
            .unwrap();
        store.delete("/a/b").await.unwrap();
        assert!(store.get("/a/b").await.is_err());
    }

    #[tokio::test]
    async fn head_reflects_existence() {
        let store = MockStoreClient::new();
        assert!(!store.head("/a/b").await.unwrap());
        store.put("/a/b", serde_json::json!({}), None).await.unwrap();
        assert!(store.head("/a/b").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_is_idempotent_and_preserves_content() {
        let store = MockStoreClient::new();
        store
            .put("/a/b", serde_json::json!({"x": 1}), None)
            .await
            .unwrap();
        store
            .ensure("/a/b", &Tree::new("application/vnd.oada.service.jobs.1+json"))
            .await
            .unwrap();
        let doc = store.get("/a/b").await.unwrap();
        assert_eq!(doc.data, serde_json::json!({"x": 1}));
    }
}
