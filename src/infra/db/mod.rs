//! Postgres node store.

mod errors;
mod nodes;

use std::time::Duration;

use sqlx::{
    migrate::MigrateError,
    postgres::{PgPool, PgPoolOptions},
};

/// Open a pool sized from configuration. Fails fast when the server is unreachable.
pub async fn connect_pool(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
}

/// Apply the embedded `migrations/` directory.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Clone)]
pub struct PgNodeStore {
    pool: PgPool,
}

impl PgNodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
