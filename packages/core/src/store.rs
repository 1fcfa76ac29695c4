//! Persistence seam for actor state.

use std::future::Future;
use std::pin::Pin;

use serde::{Serialize, de::DeserializeOwned};

/// Future type returned by [`StateStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PersistenceError>> + Send + 'a>>;

/// Crash-safe key/value storage scoped by record name.
///
/// Values are JSON documents; a successful `save` must survive a process
/// restart before the next call.
pub trait StateStore: Send + Sync + 'static {
    /// Load the document stored under `name`.
    fn load<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Replace the document stored under `name`.
    fn save<'a>(&'a self, name: &'a str, json: String) -> StoreFuture<'a, ()>;

    /// Delete the document stored under `name`. Missing names are not an error.
    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()>;

    /// List every stored name starting with `prefix`.
    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}

/// Load and deserialize a typed record.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    name: &str,
) -> Result<Option<T>, PersistenceError> {
    match store.load(name).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Serialize and save a typed record.
pub async fn save_json<T: Serialize>(
    store: &dyn StateStore,
    name: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string(value)?;
    store.save(name, json).await
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}
