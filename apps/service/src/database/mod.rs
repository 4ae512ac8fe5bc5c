/// Database abstraction layer
///
/// Repository traits describe what the monitoring engine reads and writes;
/// `DatabaseImpl` backs them with LibSQL (SQLite).
pub mod migrations;
pub mod models;
pub mod repository;

#[cfg(test)]
pub mod memory;

pub use repository::{
    Database, DatabaseImpl, LatencyLogRepository, MonitorRepository, SslEventRepository,
    UptimeEventRepository,
};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
