//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(ACTOR_STATE_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Actor state table schema.
const ACTOR_STATE_SCHEMA: &str = r#"
-- One JSON document per actor record or timer registration
DEFINE TABLE IF NOT EXISTS actor_state SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS name ON actor_state TYPE string;
DEFINE FIELD IF NOT EXISTS payload ON actor_state TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON actor_state TYPE datetime VALUE time::now();

DEFINE INDEX IF NOT EXISTS actor_state_name ON actor_state FIELDS name UNIQUE;
"#;
