//! Database bootstrap.
//!
//! One pool for the whole process; repositories clone it (a `PgPool` is an
//! `Arc` internally). Migrations are embedded with `sqlx::migrate!` so a
//! fresh deployment needs nothing beyond a reachable Postgres.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Embedded migrations from the `migrations/` directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connect to Postgres and verify the connection with a ping.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!("connected to database");
    Ok(pool)
}

/// Apply any pending migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await?;
    info!("database migrations up to date");
    Ok(())
}
