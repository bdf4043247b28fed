// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Snapshot Cache
//!
//! Idempotent persistence of peer datasets.
//!
//! Every dataset table has the same layout:
//!
//! | Column | Notes |
//! |--------|-------|
//! | `id` | surrogate, unique |
//! | `snapshot_date` | part of the primary key |
//! | identity columns | part of the primary key |
//! | value columns | overwritten on every ingestion |
//! | `ingested_at` | newest ingestion wins |
//!
//! For each row, in input order, inside one transaction:
//!
//! 1. find the newest stored row with the same identity
//! 2. found: update its values, `snapshot_date` and `ingested_at`
//! 3. not found: insert, with `ON CONFLICT (snapshot_date, identity) DO UPDATE`
//!
//! Older physical rows sharing an identity are left as they are. Nothing is
//! ever deleted.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Connection, PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::retry::RetryPolicy;

/// One bound SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(Option<String>),
    BigInt(Option<i64>),
    Double(Option<f64>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Text(v) => v.as_deref().map_or(true, |s| s.trim().is_empty()),
            Cell::BigInt(v) => v.is_none(),
            Cell::Double(v) => v.is_none(),
            Cell::Bool(v) => v.is_none(),
            Cell::Timestamp(v) => v.is_none(),
        }
    }

    fn bind_to<'q>(self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            Cell::Text(v) => query.bind(v),
            Cell::BigInt(v) => query.bind(v),
            Cell::Double(v) => query.bind(v),
            Cell::Bool(v) => query.bind(v),
            Cell::Timestamp(v) => query.bind(v),
        }
    }
}

/// Table layout of one dataset.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotSchema {
    pub table: &'static str,
    pub key_columns: &'static [&'static str],
    pub value_columns: &'static [&'static str],
}

/// A record that can be cached as a snapshot row.
pub trait SnapshotRecord {
    const SCHEMA: SnapshotSchema;

    /// Identity cells in `key_columns` order, or `None` if any is missing.
    fn identity(&self) -> Option<Vec<Cell>>;

    /// Value cells in `value_columns` order.
    fn values(&self) -> Vec<Cell>;
}

/// Builds `Some(cells)` only when no identity cell is null.
pub fn complete_identity(cells: Vec<Cell>) -> Option<Vec<Cell>> {
    if cells.iter().any(Cell::is_null) {
        None
    } else {
        Some(cells)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl SaveSummary {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

impl SnapshotSchema {
    fn key_predicate(&self, first_param: usize) -> String {
        self.key_columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ${}", first_param + i))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// `$1..$k` = identity.
    pub fn lookup_sql(&self) -> String {
        format!(
            "SELECT id FROM {} WHERE {} ORDER BY ingested_at DESC LIMIT 1",
            self.table,
            self.key_predicate(1)
        )
    }

    /// `$1..$v` = values, then `snapshot_date`, `ingested_at`, `id`.
    pub fn update_sql(&self) -> String {
        let values = self.value_columns.len();
        let assignments = self
            .value_columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ${}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {}{}snapshot_date = ${}, ingested_at = ${} WHERE id = ${}",
            self.table,
            assignments,
            if values == 0 { "" } else { ", " },
            values + 1,
            values + 2,
            values + 3
        )
    }

    /// `$1` = `snapshot_date`, then identity, values, `ingested_at`.
    pub fn insert_sql(&self) -> String {
        let mut columns = vec!["snapshot_date"];
        columns.extend_from_slice(self.key_columns);
        columns.extend_from_slice(self.value_columns);
        columns.push("ingested_at");

        let placeholders = (1..=columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let conflict_target = std::iter::once("snapshot_date")
            .chain(self.key_columns.iter().copied())
            .collect::<Vec<_>>()
            .join(", ");

        let refresh = self
            .value_columns
            .iter()
            .copied()
            .chain(std::iter::once("ingested_at"))
            .map(|column| format!("{column} = EXCLUDED.{column}"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            self.table,
            columns.join(", "),
            placeholders,
            conflict_target,
            refresh
        )
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    pool: PgPool,
    retry: RetryPolicy,
}

impl SnapshotCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::database(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Persist `rows` in one transaction. Later rows win over earlier rows
    /// with the same identity.
    pub async fn save_snapshot<R: SnapshotRecord>(
        &self,
        rows: &[R],
    ) -> Result<SaveSummary, PersistenceError> {
        let now = Utc::now();
        self.save_snapshot_at(rows, now.date_naive(), now).await
    }

    pub async fn save_snapshot_at<R: SnapshotRecord>(
        &self,
        rows: &[R],
        snapshot_date: NaiveDate,
        ingested_at: DateTime<Utc>,
    ) -> Result<SaveSummary, PersistenceError> {
        let schema = R::SCHEMA;
        let statements = Statements::for_schema(&schema);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersistenceError::database("begin", e))?;

        let mut summary = SaveSummary::default();
        for (index, row) in rows.iter().enumerate() {
            let Some(identity) = row.identity() else {
                warn!(table = schema.table, index, "snapshot row has no identity, skipped");
                summary.skipped += 1;
                continue;
            };
            let values = row.values();

            match self
                .upsert_row(&mut tx, &statements, identity, values, snapshot_date, ingested_at)
                .await
            {
                Ok(Written::Inserted) => summary.inserted += 1,
                Ok(Written::Updated) => summary.updated += 1,
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(table = schema.table, error = %rollback, "snapshot rollback failed");
                    }
                    return Err(e);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| PersistenceError::database("commit", e))?;

        info!(
            table = schema.table,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "snapshot saved"
        );
        Ok(summary)
    }

    async fn upsert_row(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        statements: &Statements,
        identity: Vec<Cell>,
        values: Vec<Cell>,
        snapshot_date: NaiveDate,
        ingested_at: DateTime<Utc>,
    ) -> Result<Written, PersistenceError> {
        let existing = self
            .retry
            .run_with("snapshot_lookup", &mut **tx, |conn| {
                let sql = statements.lookup.clone();
                let identity = identity.clone();
                Box::pin(async move { lookup_latest(conn, &sql, identity).await })
            })
            .await
            .map_err(|e| PersistenceError::database("snapshot lookup", e))?;

        match existing {
            Some(id) => {
                debug!(id, "refreshing newest snapshot row");
                self.retry
                    .run_with("snapshot_update", &mut **tx, |conn| {
                        let sql = statements.update.clone();
                        let values = values.clone();
                        Box::pin(async move {
                            let query = bind_cells(sqlx::query(&sql), values)
                                .bind(snapshot_date)
                                .bind(ingested_at)
                                .bind(id);
                            execute_in_savepoint(conn, query).await
                        })
                    })
                    .await
                    .map_err(|e| PersistenceError::database("snapshot update", e))?;
                Ok(Written::Updated)
            }
            None => {
                self.retry
                    .run_with("snapshot_insert", &mut **tx, |conn| {
                        let sql = statements.insert.clone();
                        let identity = identity.clone();
                        let values = values.clone();
                        Box::pin(async move {
                            let query = bind_cells(sqlx::query(&sql).bind(snapshot_date), identity);
                            let query = bind_cells(query, values).bind(ingested_at);
                            execute_in_savepoint(conn, query).await
                        })
                    })
                    .await
                    .map_err(|e| PersistenceError::database("snapshot insert", e))?;
                Ok(Written::Inserted)
            }
        }
    }
}

struct Statements {
    lookup: String,
    update: String,
    insert: String,
}

impl Statements {
    fn for_schema(schema: &SnapshotSchema) -> Self {
        Self {
            lookup: schema.lookup_sql(),
            update: schema.update_sql(),
            insert: schema.insert_sql(),
        }
    }
}

enum Written {
    Inserted,
    Updated,
}

fn bind_cells<'q>(
    query: Query<'q, Postgres, PgArguments>,
    cells: Vec<Cell>,
) -> Query<'q, Postgres, PgArguments> {
    cells.into_iter().fold(query, |query, cell| cell.bind_to(query))
}

// Each attempt runs in its own savepoint so a failed statement does not
// abort the enclosing transaction.
async fn lookup_latest(
    conn: &mut PgConnection,
    sql: &str,
    identity: Vec<Cell>,
) -> Result<Option<i64>, sqlx::Error> {
    let mut savepoint = conn.begin().await?;
    let result = bind_cells(sqlx::query(sql), identity)
        .fetch_optional(&mut *savepoint)
        .await
        .and_then(|row: Option<PgRow>| row.map(|r| r.try_get::<i64, _>("id")).transpose());
    finish_savepoint(savepoint, result).await
}

async fn execute_in_savepoint(
    conn: &mut PgConnection,
    query: Query<'_, Postgres, PgArguments>,
) -> Result<u64, sqlx::Error> {
    let mut savepoint = conn.begin().await?;
    let result = query
        .execute(&mut *savepoint)
        .await
        .map(|done| done.rows_affected());
    finish_savepoint(savepoint, result).await
}

async fn finish_savepoint<T>(
    savepoint: Transaction<'_, Postgres>,
    result: Result<T, sqlx::Error>,
) -> Result<T, sqlx::Error> {
    match result {
        Ok(value) => {
            savepoint.commit().await?;
            Ok(value)
        }
        Err(e) => {
            let _ = savepoint.rollback().await;
            Err(e)
        }
    }
}
