// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Reference Data Seeding
//!
//! Bulk-loads the reference tables once, safely across replicas that start
//! at the same time. Two strategies:
//!
//! - **Sentinel**: session advisory lock (non-blocking), then skip if a known
//!   sentinel row exists, else run the script in a transaction.
//! - **Versioned**: the script's SHA-256 is its version; skip if
//!   `seed_metadata` already records it, else run the comment-stripped script
//!   and record the version, all under a transaction-scoped advisory lock.
//!
//! Neither strategy returns an error. Every path ends in a [`SeedOutcome`].

use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use tracing::{error, info, warn};

use crate::config::SeedStrategy;

/// Reference data shipped with the service.
pub const REFERENCE_SEED: &str = include_str!("../../seeds/reference_data.sql");

/// Session lock id for the sentinel strategy.
pub const SEED_LOCK_ID: i64 = 0x5EED_0001;
/// Transaction lock id for the versioned strategy.
pub const VERSIONED_SEED_LOCK_ID: i64 = 0x5EED_0002;

const ENSURE_METADATA_SQL: &str = "CREATE TABLE IF NOT EXISTS seed_metadata (\
     version TEXT PRIMARY KEY, \
     applied_at TIMESTAMPTZ NOT NULL DEFAULT now())";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedReason {
    Applied,
    LockNotAcquired,
    AlreadyApplied,
    /// A unique violation during the script; rows were already there.
    DuplicateKey,
    Failed,
    Disabled,
}

impl SeedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SeedReason::Applied => "applied",
            SeedReason::LockNotAcquired => "lock_not_acquired",
            SeedReason::AlreadyApplied => "already_applied",
            SeedReason::DuplicateKey => "duplicate_key",
            SeedReason::Failed => "failed",
            SeedReason::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for SeedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOutcome {
    pub applied: bool,
    pub reason: SeedReason,
    pub detail: Option<String>,
}

impl SeedOutcome {
    fn applied() -> Self {
        Self {
            applied: true,
            reason: SeedReason::Applied,
            detail: None,
        }
    }

    fn skipped(reason: SeedReason) -> Self {
        Self {
            applied: false,
            reason,
            detail: None,
        }
    }

    fn failed(stage: &str, err: impl std::fmt::Display) -> Self {
        error!(stage, error = %err, "reference data seed failed");
        Self {
            applied: false,
            reason: SeedReason::Failed,
            detail: Some(format!("{stage}: {err}")),
        }
    }
}

/// Row whose presence marks the sentinel seed as done.
#[derive(Debug, Clone, Copy)]
pub struct SentinelCheck {
    pub table: &'static str,
    pub column: &'static str,
    pub value: &'static str,
}

impl SentinelCheck {
    pub const REFERENCE: SentinelCheck = SentinelCheck {
        table: "report_templates",
        column: "code",
        value: "course-completion",
    };

    fn sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
            self.table, self.column
        )
    }
}

#[derive(Debug, Clone)]
pub struct SeedCoordinator {
    pool: PgPool,
    script: String,
    sentinel: SentinelCheck,
    lock_id: i64,
    versioned_lock_id: i64,
}

impl SeedCoordinator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            script: REFERENCE_SEED.to_string(),
            sentinel: SentinelCheck::REFERENCE,
            lock_id: SEED_LOCK_ID,
            versioned_lock_id: VERSIONED_SEED_LOCK_ID,
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    pub fn with_sentinel(mut self, sentinel: SentinelCheck) -> Self {
        self.sentinel = sentinel;
        self
    }

    pub fn with_lock_ids(mut self, session: i64, transaction: i64) -> Self {
        self.lock_id = session;
        self.versioned_lock_id = transaction;
        self
    }

    pub async fn run(&self, strategy: SeedStrategy) -> SeedOutcome {
        let outcome = match strategy {
            SeedStrategy::Sentinel => self.seed_with_sentinel().await,
            SeedStrategy::Versioned => self.seed_versioned().await,
            SeedStrategy::Off => SeedOutcome::skipped(SeedReason::Disabled),
        };
        info!(
            strategy = ?strategy,
            applied = outcome.applied,
            reason = %outcome.reason,
            "reference data seed finished"
        );
        outcome
    }

    pub async fn seed_with_sentinel(&self) -> SeedOutcome {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return SeedOutcome::failed("acquire", e),
        };

        let locked = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
            .bind(self.lock_id)
            .fetch_one(&mut *conn)
            .await;
        match locked {
            Ok(true) => {}
            Ok(false) => {
                info!(lock_id = self.lock_id, "another replica is seeding, skipping");
                return SeedOutcome::skipped(SeedReason::LockNotAcquired);
            }
            Err(e) => return SeedOutcome::failed("advisory lock", e),
        }

        let outcome = self.seed_locked(&mut conn).await;
        self.release(conn).await;
        outcome
    }

    async fn seed_locked(&self, conn: &mut PgConnection) -> SeedOutcome {
        let present = sqlx::query_scalar::<_, bool>(&self.sentinel.sql())
            .bind(self.sentinel.value)
            .fetch_one(&mut *conn)
            .await;
        match present {
            Ok(true) => return SeedOutcome::skipped(SeedReason::AlreadyApplied),
            Ok(false) => {}
            Err(e) => return SeedOutcome::failed("sentinel check", e),
        }

        let mut tx = match conn.begin().await {
            Ok(tx) => tx,
            Err(e) => return SeedOutcome::failed("begin", e),
        };

        match sqlx::raw_sql(&self.script).execute(&mut *tx).await {
            Ok(_) => match tx.commit().await {
                Ok(()) => {
                    info!(sentinel = self.sentinel.value, "reference data seeded");
                    SeedOutcome::applied()
                }
                Err(e) => SeedOutcome::failed("commit", e),
            },
            Err(e) if is_unique_violation(&e) => {
                let _ = tx.rollback().await;
                warn!(error = %e, "seed hit existing rows, treating as already seeded");
                SeedOutcome {
                    applied: false,
                    reason: SeedReason::DuplicateKey,
                    detail: Some(e.to_string()),
                }
            }
            Err(e) => {
                let _ = tx.rollback().await;
                SeedOutcome::failed("seed script", e)
            }
        }
    }

    // A session lock that cannot be released must not go back to the pool.
    async fn release(&self, mut conn: PoolConnection<Postgres>) {
        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(self.lock_id)
            .fetch_one(&mut *conn)
            .await;
        match unlocked {
            Ok(true) => {}
            Ok(false) => {
                warn!(lock_id = self.lock_id, "advisory lock was not held at release; closing connection");
                let _ = conn.detach().close().await;
            }
            Err(e) => {
                warn!(lock_id = self.lock_id, error = %e, "advisory unlock failed; closing connection");
                let _ = conn.detach().close().await;
            }
        }
    }

    pub async fn seed_versioned(&self) -> SeedOutcome {
        let version = script_version(&self.script);

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return SeedOutcome::failed("begin", e),
        };

        match version_recorded(&mut tx, self.versioned_lock_id, &version).await {
            Ok(true) => {
                let _ = tx.rollback().await;
                info!(version = %version, "seed version already recorded");
                return SeedOutcome::skipped(SeedReason::AlreadyApplied);
            }
            Ok(false) => {}
            Err(e) => {
                let _ = tx.rollback().await;
                return SeedOutcome::failed("seed metadata", e);
            }
        }

        if let Err(e) = apply_versioned(&mut tx, &strip_sql_comments(&self.script), &version).await {
            let _ = tx.rollback().await;
            return SeedOutcome::failed("seed script", e);
        }
        match tx.commit().await {
            Ok(()) => {
                info!(version = %version, "versioned reference seed applied");
                SeedOutcome::applied()
            }
            Err(e) => SeedOutcome::failed("commit", e),
        }
    }
}

// Serializes versioned seeding for the rest of the transaction.
async fn version_recorded(
    conn: &mut PgConnection,
    lock_id: i64,
    version: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(lock_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(ENSURE_METADATA_SQL).execute(&mut *conn).await?;
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM seed_metadata WHERE version = $1)")
        .bind(version)
        .fetch_one(&mut *conn)
        .await
}

async fn apply_versioned(conn: &mut PgConnection, script: &str, version: &str) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(script).execute(&mut *conn).await?;
    sqlx::query("INSERT INTO seed_metadata (version) VALUES ($1)")
        .bind(version)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Hex SHA-256 of the script text.
pub fn script_version(script: &str) -> String {
    format!("{:x}", Sha256::digest(script.as_bytes()))
}

/// Drop whole-line `--` comments and blank lines.
pub fn strip_sql_comments(script: &str) -> String {
    script
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with("--")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
