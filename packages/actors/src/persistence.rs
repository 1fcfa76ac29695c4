//! State stores for actors: file-based and in-memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jobs_core::{PersistenceError, StateStore, StoreFuture};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;

/// File-based state store.
///
/// Each record is one JSON file under the base directory, replaced atomically
/// on every save.
pub struct FileStore {
    /// Base directory for state files.
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new file store.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Ensure the base directory exists.
    pub async fn init(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", encode_name(name)))
    }

    async fn read(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(name);

        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let mut file = fs::File::open(&path).await?;
        let mut json = String::new();
        file.read_to_string(&mut json).await?;

        tracing::debug!("Loaded state from {:?}", path);
        Ok(Some(json))
    }

    async fn write(&self, name: &str, json: String) -> Result<(), PersistenceError> {
        let path = self.path_for(name);

        // Write to temp file first, then rename for atomicity
        let temp_path = self.base_dir.join(format!("{}.json.tmp", encode_name(name)));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Saved state to {:?}", path);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(name);

        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            tracing::debug!("Deleted state file {:?}", path);
        }

        Ok(())
    }

    async fn names(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        let mut names = Vec::new();

        if !fs::try_exists(&self.base_dir).await? {
            return Ok(names);
        }

        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json")
                && let Some(stem) = path.file_stem()
                && let Some(name) = decode_name(&stem.to_string_lossy())
                && name.starts_with(prefix)
            {
                names.push(name);
            }
        }

        Ok(names)
    }
}

impl StateStore for FileStore {
    fn load<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(self.read(name))
    }

    fn save<'a>(&'a self, name: &'a str, json: String) -> StoreFuture<'a, ()> {
        Box::pin(self.write(name, json))
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.remove(name))
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(self.names(prefix))
    }
}

/// Escape everything but `[A-Za-z0-9_-]` as `%XX` so names are file-safe.
fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_name(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// In-memory state store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.records.read().await.get(name).cloned()) })
    }

    fn save<'a>(&'a self, name: &'a str, json: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.records.write().await.insert(name.to_string(), json);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.records.write().await.remove(name);
            Ok(())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .await
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        })
    }
}
