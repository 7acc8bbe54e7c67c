use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connections for an operator command: a handful of aggregate queries and
/// the occasional bulk load.
pub const COMMAND_CONNECTIONS: u32 = 5;

/// A worker only ever runs one claim or completion at a time.
pub const WORKER_CONNECTIONS: u32 = 2;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Create the queue tables if they do not exist yet
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

pub mod queries;
