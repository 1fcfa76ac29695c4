//! SurrealDB-backed state storage for the job runtime.
//!
//! This crate provides a [`jobs_core::StateStore`] implementation that keeps
//! actor state and durable timer registrations in SurrealDB.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
mod store;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::init_schema;
pub use store::SurrealStore;
