// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Postgres pool and schema migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::PersistenceError;

pub type DbPool = PgPool;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, PersistenceError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(Some(IDLE_TIMEOUT))
        .test_before_acquire(true)
        .connect(database_url)
        .await
        .map_err(|e| PersistenceError::database("connect", e))?;

    info!(max_connections, "database pool ready");
    Ok(pool)
}

/// Apply `migrations/` in order.
pub async fn run_migrations(pool: &DbPool) -> Result<(), PersistenceError> {
    sqlx::migrate!().run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

/// Round-trip a trivial query; used by the readiness probe.
pub async fn ping(pool: &DbPool) -> Result<(), PersistenceError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::database("ping", e))?;
    Ok(())
}
