//! Subscribes to one service's pending-jobs list and dispatches a `Runner`
//! per entry onto a bounded-concurrency executor.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::jobs::runner::Runner;
use crate::jobs::service::ServiceContext;
use crate::store::watch::ChangeKind;
use crate::store::{media_type, paths, MediaType, SubscriptionId, Tree};

const META_KEYS: &[&str] = &["_id", "_rev", "_meta", "_type"];

pub struct Queue {
    ctx: Arc<ServiceContext>,
    semaphore: Arc<Semaphore>,
    inflight: Arc<Mutex<JoinSet<()>>>,
    stopping: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
    subscription: Option<SubscriptionId>,
}

impl Queue {
    pub fn new(ctx: Arc<ServiceContext>, concurrency: usize) -> Self {
        Self {
            ctx,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            inflight: Arc::new(Mutex::new(JoinSet::new())),
            stopping: Arc::new(AtomicBool::new(false)),
            consumer: None,
            subscription: None,
        }
    }

    pub async fn start(&mut self, skip_existing: bool) -> Result<()> {
        let service = self.ctx.name.clone();
        let jobs_tree = Tree::new(media_type(MediaType::JobsContainer));
        let bucket_tree = Tree::new(media_type(MediaType::DayBucket));

        self.ctx
            .store
            .ensure(&paths::jobs_root(&service), &jobs_tree)
            .await?;
        let pending_path = paths::pending(&service);
        self.ctx.store.ensure(&pending_path, &bucket_tree).await?;
        self.ctx
            .store
            .ensure(&format!("{}/success", paths::jobs_root(&service)), &bucket_tree)
            .await?;
        self.ctx
            .store
            .ensure(&format!("{}/failure", paths::jobs_root(&service)), &bucket_tree)
            .await?;

        let doc = self.ctx.store.get(&pending_path).await?;

        let (sub_id, mut stream) = self
            .ctx
            .store
            .watch(&pending_path, Some(doc.rev.clone()))
            .await?;
        self.subscription = Some(sub_id);

        let ctx = self.ctx.clone();
        let semaphore = self.semaphore.clone();
        let inflight = self.inflight.clone();
        let stopping = self.stopping.clone();

        let consumer = tokio::spawn(async move {
            loop {
                match stream.recv().await {
                    Some(event) => {
                        if event.change.kind != ChangeKind::Merge {
                            debug!("ignoring non-merge change on pending list");
                            continue;
                        }
                        dispatch(&ctx, &semaphore, &inflight, event.change.body);
                    }
                    None => {
                        if stopping.load(Ordering::SeqCst) {
                            info!(service = %ctx.name, "pending-list consumer stopped");
                        } else {
                            error!(service = %ctx.name, "pending-list subscription collapsed unexpectedly");
                        }
                        break;
                    }
                }
            }
        });
        self.consumer = Some(consumer);

        if !skip_existing {
            dispatch(&self.ctx, &self.semaphore, &self.inflight, doc.data);
        }

        Ok(())
    }

    /// Unsubscribes and waits for in-flight runners to complete. No new
    /// runners are started once this has been called.
    pub async fn stop(self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(sub_id) = self.subscription {
            let _ = self.ctx.store.unwatch(sub_id).await;
        }
        if let Some(consumer) = self.consumer {
            consumer.abort();
        }
        let mut set = self.inflight.lock().await;
        while set.join_next().await.is_some() {}
    }
}

fn dispatch(
    ctx: &Arc<ServiceContext>,
    semaphore: &Arc<Semaphore>,
    inflight: &Arc<Mutex<JoinSet<()>>>,
    body: Value,
) {
    let Some(entries) = body.as_object() else {
        warn!("malformed pending change body, ignoring");
        return;
    };

    for (job_key, entry) in entries {
        if META_KEYS.contains(&job_key.as_str()) {
            continue;
        }
        let Some(job_path) = entry.get("_id").and_then(|v| v.as_str()).map(str::to_string) else {
            warn!(job_key, "pending entry missing a link, ignoring");
            continue;
        };

        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let inflight = inflight.clone();
        let job_key = job_key.clone();

        tokio::spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else {
                return;
            };
            let mut set = inflight.lock().await;
            set.spawn(async move {
                let _permit = permit;
                Runner::new(ctx, job_key, job_path).run().await;
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::config::WorkerConfig;
    use crate::jobs::worker::{Worker, WorkerEntry};
    use crate::store::MockStoreClient;
    use std::time::Duration;

    #[tokio::test]
    async fn existing_pending_entries_are_drained_on_start() {
        let store: Arc<dyn crate::store::StoreClient> = Arc::new(MockStoreClient::new());
        let ctx = Arc::new(ServiceContext::new("svc".into(), store.clone()));
        let work: Arc<dyn Worker> =
            Arc::new(|_job, _ctx| async move { Ok(serde_json::json!({"ok": true})) });
        ctx.workers
            .insert("demo".into(), WorkerEntry::new(work, WorkerConfig::default()));

        store
            .put(
                "/resources/1",
                serde_json::json!({"service": "svc", "type": "demo", "config": {}}),
                None,
            )
            .await
            .unwrap();
        store
            .put(
                "/bookmarks/services/svc/jobs/pending/k1",
                serde_json::json!({"_id": "/resources/1"}),
                None,
            )
            .await
            .unwrap();

        let mut queue = Queue::new(ctx.clone(), 4);
        queue.start(false).await.unwrap();

        loop {
            let job_doc = store.get("/resources/1").await.unwrap();
            if job_doc.data.get("status").and_then(|s| s.as_str()) == Some("success") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!store
            .head("/bookmarks/services/svc/jobs/pending/k1")
            .await
            .unwrap());

        queue.stop().await;
    }
}
