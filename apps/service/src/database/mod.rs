/// Result store
///
/// Monitor and channel configuration is read from here by the scheduler, and
/// every probe result, transition, state snapshot and delivery outcome is
/// appended here. Backed by LibSQL (SQLite) through a deadpool pool.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
