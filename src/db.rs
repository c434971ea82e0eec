//! Database connection pool and migration management.
//!
//! Each service owns its own database and its own migration directory:
//! `migrations/balance` for the ledger, `migrations/stats` for the report store.

use std::time::Duration;

use sqlx::{Pool, Postgres};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// The pool is created once per process and cloned into every store. Each
/// ledger operation checks out a connection (or opens a transaction) for its
/// own duration only.
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the server cannot
/// be reached within `connect_timeout`.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    connect_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect(database_url)
        .await
}

/// Run the ledger schema migrations (accounts, transactions, reservations, operations).
pub async fn run_balance_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations/balance").run(pool).await
}

/// Run the statistics schema migrations.
pub async fn run_stats_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations/stats").run(pool).await
}
