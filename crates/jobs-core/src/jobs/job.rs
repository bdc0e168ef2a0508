//! The job document: a typed view over the store's representation of one
//! job, including the bounded-retry load used to cope with a link that
//! briefly points at an empty document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::store::StoreClient;

/// Terminal or in-flight status of a job document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_path_segment(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
        }
    }
}

/// One entry in a job's `updates` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: String,
    pub time: String,
    #[serde(default)]
    pub meta: Value,
}

/// The job document as stored, plus bookkeeping for the load-retry rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// The store's own identifier for this document, e.g. `/resources/abc`.
    pub id: String,
    pub service: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub updates: BTreeMap<String, JobUpdate>,

    /// Set to `false` when the document failed shape validation after one
    /// retry. A job flagged this way is filed as a failure with an empty
    /// result rather than dispatched to a worker.
    #[serde(skip)]
    pub is_job: bool,
}

impl Job {
    /// Construct directly from a raw document `Value`, validating shape.
    fn from_value(id: String, data: Value) -> Self {
        let is_job = data.get("service").is_some()
            && data.get("type").is_some()
            && data.get("config").is_some();

        if !is_job {
            return Job {
                id,
                service: String::new(),
                job_type: String::new(),
                config: Value::Null,
                status: None,
                result: Value::Null,
                updates: BTreeMap::new(),
                is_job: false,
            };
        }

        let mut job: Job = match serde_json::from_value(data) {
            Ok(job) => job,
            Err(_) => {
                return Job {
                    id,
                    service: String::new(),
                    job_type: String::new(),
                    config: Value::Null,
                    status: None,
                    result: Value::Null,
                    updates: BTreeMap::new(),
                    is_job: false,
                }
            }
        };
        job.id = id;
        job.is_job = true;
        job
    }

    /// Load a job document by its store identifier, retrying once on a
    /// momentarily empty document (creation-before-link race).
    pub async fn load(store: &dyn StoreClient, id: &str) -> Result<Job> {
        let doc = store.get(id).await?;
        let job = Job::from_value(id.to_string(), doc.data);
        if job.is_job {
            return Ok(job);
        }

        let doc = store.get(id).await?;
        Ok(Job::from_value(id.to_string(), doc.data))
    }

    /// The update, if any, whose status matches `status`, most recent first.
    pub fn last_update_matching(&self, status: &str) -> Option<&JobUpdate> {
        self.updates.values().rev().find(|u| u.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStoreClient;

    #[tokio::test]
    async fn load_valid_job() {
        let store = MockStoreClient::new();
        store
            .seed(
                "/resources/1",
                serde_json::json!({
                    "service": "svc",
                    "type": "demo",
                    "config": {"a": 1},
                }),
            )
            .await;
        let job = Job::load(&store, "/resources/1").await.unwrap();
        assert!(job.is_job);
        assert_eq!(job.service, "svc");
        assert_eq!(job.job_type, "demo");
    }

    #[tokio::test]
    async fn load_invalid_job_after_retry() {
        let store = MockStoreClient::new();
        store.seed("/resources/1", serde_json::json!({})).await;
        let job = Job::load(&store, "/resources/1").await.unwrap();
        assert!(!job.is_job);
    }

    #[test]
    fn last_update_matching_returns_most_recent() {
        let mut job = Job {
            id: "x".into(),
            service: "svc".into(),
            job_type: "demo".into(),
            config: Value::Null,
            status: None,
            result: Value::Null,
            updates: BTreeMap::new(),
            is_job: true,
        };
        job.updates.insert(
            "01A".into(),
            JobUpdate {
                status: "started".into(),
                time: "2024-01-01T00:00:00Z".into(),
                meta: Value::Null,
            },
        );
        job.updates.insert(
            "01B".into(),
            JobUpdate {
                status: "success".into(),
                time: "2024-01-01T00:01:00Z".into(),
                meta: Value::Null,
            },
        );
        let matched = job.last_update_matching("success").unwrap();
        assert_eq!(matched.time, "2024-01-01T00:01:00Z");
    }
}
