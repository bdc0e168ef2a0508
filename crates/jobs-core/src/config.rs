//! Service configuration: defaults, TOML file, environment overrides.
//!
//! Mirrors the teacher's `Config::load`/`Config::from_env` split: a
//! `ServiceConfig` always has sane defaults, can be read from a TOML file,
//! and individual fields can be overridden by environment variables before
//! `validate()` gates `Service::new`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration for one `Service`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service namespace under `/bookmarks/services`.
    pub name: String,

    #[serde(default)]
    pub store: StoreConfig,

    /// Bounded-concurrency executor size. 0 means "use the store client's default".
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub opts: ServiceOptions,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, store: StoreConfig) -> Self {
        Self {
            name: name.into(),
            store,
            concurrency: default_concurrency(),
            opts: ServiceOptions::default(),
        }
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config file: {e}")))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `JOBS_CONFIG` (a TOML file path), falling back to
    /// conventional locations, then environment variable overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = if let Ok(path) = std::env::var("JOBS_CONFIG") {
            Self::load(path)?
        } else {
            let default_paths = ["./config/jobs.toml", "/etc/jobs/config.toml"];
            match default_paths.iter().find(|p| Path::new(p).exists()) {
                Some(path) => Self::load(path)?,
                None => return Err(Error::Config(
                    "no JOBS_CONFIG set and no default config file found".to_string(),
                )),
            }
        };

        if let Ok(name) = std::env::var("JOBS_SERVICE_NAME") {
            config.name = name;
        }
        if let Ok(domain) = std::env::var("JOBS_STORE_DOMAIN") {
            config.store.domain = domain;
        }
        if let Ok(token) = std::env::var("JOBS_STORE_TOKEN") {
            config.store.token = token;
        }
        if let Ok(concurrency) = std::env::var("JOBS_CONCURRENCY") {
            config.concurrency = concurrency
                .parse()
                .map_err(|_| Error::Config("JOBS_CONCURRENCY must be a number".to_string()))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("service name must not be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be > 0".to_string()));
        }
        if self.store.domain.trim().is_empty() {
            return Err(Error::Config("store.domain must not be empty".to_string()));
        }
        url::Url::parse(&self.store.domain)
            .map_err(|e| Error::Config(format!("store.domain is not a valid URL: {e}")))?;
        Ok(())
    }
}

fn default_concurrency() -> usize {
    10
}

/// Connection parameters for the production `HttpStoreClient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. `https://oada.example.com`.
    #[serde(default)]
    pub domain: String,

    /// Bearer token used for every request.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            token: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Options controlling Queue/Runner behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceOptions {
    /// Ordered finish reporters, most-recently-registered last.
    #[serde(default)]
    pub finish_reporters: Vec<crate::jobs::finish_reporter::FinishReporter>,

    /// When true, `Queue::start` does not dispatch pre-existing pending
    /// entries; it only reacts to new changes.
    #[serde(default)]
    pub skip_queue_on_startup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_rejects_empty_domain() {
        let config = ServiceConfig::new("svc", StoreConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        let mut store = StoreConfig::default();
        store.domain = "https://oada.example.com".to_string();
        let config = ServiceConfig::new("svc", store);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut store = StoreConfig::default();
        store.domain = "https://oada.example.com".to_string();
        let mut config = ServiceConfig::new("svc", store);
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
