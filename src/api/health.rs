// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::storage;
use crate::sync_poller::DatasetStatus;

/// Health check response with individual component status.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub service: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Database reachability (if a pool is configured).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Snapshot freshness: "ok", "pending" or "stale". Stale snapshots are
    /// still served, so this never fails readiness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<String>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn check_database(state: &AppState) -> Option<String> {
    let pool = state.pool.as_ref()?;
    match storage::ping(pool).await {
        Ok(()) => Some("ok".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "readiness: database ping failed");
            Some("unavailable".to_string())
        }
    }
}

fn check_snapshots(state: &AppState) -> Option<String> {
    let statuses = state.sync_status.as_ref()?.snapshot();
    let label = if statuses.is_empty() {
        "pending"
    } else if statuses.iter().all(|s| s.last_error.is_none()) {
        "ok"
    } else {
        "stale"
    };
    Some(label.to_string())
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if the database is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = check_database(&state).await;
    let snapshots = check_snapshots(&state);

    let all_ok = database.as_deref().map(|s| s == "ok").unwrap_or(true);

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        service: state.service_name.clone(),
        checks: HealthChecks {
            service: "ok".to_string(),
            database,
            snapshots,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler. Does not check dependencies.
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

/// Per-dataset sync status, for operators chasing stale reports.
pub async fn snapshot_status(
    State(state): State<AppState>,
) -> Result<Json<Vec<DatasetStatus>>, ApiError> {
    let status = state
        .sync_status
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("snapshot sync is not running"))?;
    Ok(Json(status.snapshot()))
}
