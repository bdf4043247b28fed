// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage
//!
//! Postgres-backed persistence for the reporting service.
//!
//! - [`db`]: pool construction and migrations
//! - [`snapshot`]: idempotent snapshot upserts
//! - [`datasets`]: table mappings for each peer dataset
//! - [`seed`]: one-time reference data seeding across replicas

pub mod datasets;
pub mod db;
pub mod seed;
pub mod snapshot;

pub use db::{create_pool, ping, run_migrations, DbPool};
pub use seed::{SeedCoordinator, SeedOutcome, SeedReason, SentinelCheck};
pub use snapshot::{Cell, SaveSummary, SnapshotCache, SnapshotRecord, SnapshotSchema};
