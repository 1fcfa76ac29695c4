//! [`StateStore`] backed by the `actor_state` table.

use jobs_core::{PersistenceError, StateStore, StoreFuture};
use serde::{Deserialize, Serialize};

use crate::{Database, DbConfig, DbError, connect, init_schema};

const TABLE: &str = "actor_state";

/// Internal record type for SurrealDB writes.
#[derive(Debug, Clone, Serialize)]
struct StateWrite {
    name: String,
    payload: String,
}

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct StateRecord {
    #[allow(dead_code)]
    name: String,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    name: String,
}

/// State store persisting JSON documents in SurrealDB.
#[derive(Clone)]
pub struct SurrealStore {
    db: Database,
}

impl SurrealStore {
    /// Wrap an already connected database. The schema must be initialized.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect, initialize the schema and return a ready store.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let db = connect(config).await?;
        init_schema(&db).await?;
        Ok(Self::new(db))
    }

    async fn load_record(&self, name: &str) -> Result<Option<String>, DbError> {
        let record: Option<StateRecord> = self.db.select((TABLE, name)).await?;
        Ok(record.map(|r| r.payload))
    }

    async fn save_record(&self, name: &str, payload: String) -> Result<(), DbError> {
        let write = StateWrite {
            name: name.to_string(),
            payload,
        };
        let record: Option<StateRecord> = self.db.upsert((TABLE, name)).content(write).await?;
        record
            .map(|_| ())
            .ok_or_else(|| DbError::Query(format!("Failed to save state: {}", name)))
    }

    async fn delete_record(&self, name: &str) -> Result<(), DbError> {
        let _: Option<StateRecord> = self.db.delete((TABLE, name)).await?;
        Ok(())
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, DbError> {
        let mut result = self
            .db
            .query("SELECT name FROM actor_state WHERE string::starts_with(name, $prefix)")
            .bind(("prefix", prefix.to_string()))
            .await?;

        let rows: Vec<NameRow> = result.take(0)?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }
}

fn backend(e: DbError) -> PersistenceError {
    PersistenceError::Backend(e.to_string())
}

impl StateStore for SurrealStore {
    fn load<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { self.load_record(name).await.map_err(backend) })
    }

    fn save<'a>(&'a self, name: &'a str, json: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.save_record(name, json).await.map_err(backend)?;
            tracing::debug!("Saved state {}", name);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.delete_record(name).await.map_err(backend) })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move { self.list_names(prefix).await.map_err(backend) })
    }
}
