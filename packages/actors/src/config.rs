//! Runtime configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use db::{DbConfig, SurrealStore};
use jobs_core::StateStore;

use crate::messages::ActorError;
use crate::persistence::{FileStore, MemoryStore};

/// Where actor state and timer registrations are kept.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Process memory; nothing survives a restart.
    Memory,
    /// One JSON file per record under the given directory.
    File(PathBuf),
    /// SurrealDB at the configured endpoint.
    Surreal(DbConfig),
}

/// Configuration for the job runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Period of the heartbeat timer that refreshes a running job's duration.
    pub heartbeat_period: Duration,
    /// Delay between polls when a queue handler finds its queue empty.
    pub poll_interval: Duration,
    /// Timeout for request/reply calls into actors.
    pub rpc_timeout: Duration,
    /// Upper bound on a single run; `None` lets runs take as long as they need.
    pub run_timeout: Option<Duration>,
    pub store: StoreBackend,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            rpc_timeout: Duration::from_secs(5),
            run_timeout: None,
            store: StoreBackend::Memory,
        }
    }
}

impl RuntimeConfig {
    /// Build a config from `JOBS_*` environment variables, falling back to defaults.
    ///
    /// - `JOBS_STORE`: `memory` (default), `file` or `surreal`
    /// - `JOBS_DATA_DIR`: data directory for the file store
    /// - `JOBS_SURREAL_ENDPOINT`: SurrealDB endpoint, `mem://` by default
    ///   (`rocksdb://` endpoints need the `rocksdb` feature)
    /// - `JOBS_POLL_INTERVAL_MS`, `JOBS_RPC_TIMEOUT_MS`, `JOBS_HEARTBEAT_SECS`
    /// - `JOBS_RUN_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ActorError> {
        let mut config = Self::default();
        let data_dir = std::env::var("JOBS_DATA_DIR").unwrap_or_else(|_| "./data/jobs".to_string());

        if let Ok(store) = std::env::var("JOBS_STORE") {
            config.store = match store.as_str() {
                "memory" => StoreBackend::Memory,
                "file" => StoreBackend::File(PathBuf::from(&data_dir)),
                "surreal" => StoreBackend::Surreal(
                    std::env::var("JOBS_SURREAL_ENDPOINT")
                        .map(DbConfig::endpoint)
                        .unwrap_or_else(|_| DbConfig::memory()),
                ),
                other => return Err(ActorError::Config(format!("Unknown JOBS_STORE: {}", other))),
            };
        }

        if let Some(ms) = env_u64("JOBS_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("JOBS_RPC_TIMEOUT_MS")? {
            config.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("JOBS_HEARTBEAT_SECS")? {
            config.heartbeat_period = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_u64("JOBS_RUN_TIMEOUT_SECS")? {
            config.run_timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Set the store backend.
    pub fn with_store(mut self, store: StoreBackend) -> Self {
        self.store = store;
        self
    }

    /// Set the heartbeat period.
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Set the queue poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Open the configured state store.
    pub async fn open_store(&self) -> Result<Arc<dyn StateStore>, ActorError> {
        let store: Arc<dyn StateStore> = match &self.store {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::File(dir) => {
                let store = FileStore::new(dir);
                store.init().await?;
                Arc::new(store)
            }
            StoreBackend::Surreal(db_config) => {
                let store = SurrealStore::open(db_config)
                    .await
                    .map_err(|e| ActorError::Config(format!("Failed to open database: {}", e)))?;
                Arc::new(store)
            }
        };
        Ok(store)
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, ActorError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ActorError::Config(format!("{} must be an integer, got {:?}", name, value))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.heartbeat_period, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(config.run_timeout.is_none());
        assert!(matches!(config.store, StoreBackend::Memory));
    }

    #[tokio::test]
    async fn test_open_file_store_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        let config = RuntimeConfig::default().with_store(StoreBackend::File(path.clone()));

        let store = config.open_store().await.unwrap();
        store.save("job:a", "{}".to_string()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_surreal_memory_store() {
        let config = RuntimeConfig::default().with_store(StoreBackend::Surreal(DbConfig::memory()));

        let store = config.open_store().await.unwrap();
        store.save("job:a", "{}".to_string()).await.unwrap();
        assert_eq!(store.load("job:a").await.unwrap(), Some("{}".to_string()));
    }
}
