//! SurrealDB connections for the state store.

use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use thiserror::Error;

/// A connection to any SurrealDB engine, chosen by endpoint scheme.
pub type Database = Surreal<Any>;

/// Where and how to connect.
///
/// The endpoint scheme picks the engine: `mem://` is always available,
/// `rocksdb://<path>` needs the `rocksdb` feature.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Root username and password, for servers that require sign-in.
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::endpoint("mem://")
    }
}

impl DbConfig {
    /// Connect to an arbitrary endpoint in the `jobs` namespace.
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: "jobs".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }

    /// Volatile in-process engine, used by tests and the default runtime.
    pub fn memory() -> Self {
        Self::default()
    }

    /// On-disk RocksDB engine under `path`.
    pub fn rocksdb(path: impl AsRef<str>) -> Self {
        Self::endpoint(format!("rocksdb://{}", path.as_ref()))
    }

    pub fn is_memory(&self) -> bool {
        self.endpoint.starts_with("mem://")
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Errors from the SurrealDB layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
}

/// Open a connection, sign in if credentials are set, and select the
/// configured namespace and database.
pub async fn connect(config: &DbConfig) -> Result<Database, DbError> {
    tracing::info!(endpoint = %config.endpoint, "Connecting to state database");

    let db = surrealdb::engine::any::connect(config.endpoint.as_str()).await?;

    if let Some((username, password)) = &config.credentials {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await?;
    }

    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    tracing::info!(
        namespace = %config.namespace,
        database = %config.database,
        "State database ready"
    );
    Ok(db)
}
