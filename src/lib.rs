// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Reporting - Trust & Snapshot Core
//!
//! Reporting backend that aggregates peer microservice data through a
//! central Coordinator. Every inter-service call travels in a signed
//! envelope; fetched data is cached in Postgres without duplicates even when
//! several replicas run at once.
//!
//! ## Modules
//!
//! - `signing` - Canonical messages and P-256 envelope signatures
//! - `coordinator` - Signed envelope client and boot-time registration
//! - `peers` - Peer dataset clients (assessment, catalog, directory, analytics)
//! - `storage` - Snapshot cache and reference data seeding (Postgres)
//! - `sync_poller` - Background snapshot refresh
//! - `api` - Health endpoints (Axum)

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod peers;
pub mod retry;
pub mod signing;
pub mod state;
pub mod storage;
pub mod sync_poller;
