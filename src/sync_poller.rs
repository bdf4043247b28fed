// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Snapshot Sync Poller
//!
//! Background task that refreshes the snapshot cache from every peer.
//!
//! Every `interval` (default 15 min) each dataset is fetched through the
//! Coordinator and saved. A failed fetch or save only affects that dataset:
//! its previous snapshot stays in place and is served as-is.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, checked between sweeps and
//! while sleeping.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::peers::{Assessments, Courses, Directory, LearnerProgress, PeerClient, PeerDataset};
use crate::storage::{SaveSummary, SnapshotCache, SnapshotRecord};

/// Last sync result for one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub peer: &'static str,
    pub last_attempt_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Shared view of dataset freshness, read by the readiness probe.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    inner: Arc<RwLock<Vec<DatasetStatus>>>,
}

impl SyncStatus {
    pub fn snapshot(&self) -> Vec<DatasetStatus> {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, peer: &'static str, result: &Result<SaveSummary, RelayError>) {
        let Ok(mut statuses) = self.inner.write() else {
            return;
        };
        let now = Utc::now();
        let previous_success = statuses
            .iter()
            .find(|s| s.peer == peer)
            .and_then(|s| s.last_success_at);
        let status = DatasetStatus {
            peer,
            last_attempt_at: now,
            last_success_at: match result {
                Ok(_) => Some(now),
                Err(_) => previous_success,
            },
            last_error: result.as_ref().err().map(|e| e.to_string()),
        };
        match statuses.iter_mut().find(|s| s.peer == peer) {
            Some(existing) => *existing = status,
            None => statuses.push(status),
        }
    }
}

pub struct SyncPoller {
    peers: PeerClient,
    cache: SnapshotCache,
    interval: Duration,
    status: SyncStatus,
}

impl SyncPoller {
    pub fn new(peers: PeerClient, cache: SnapshotCache, interval: Duration) -> Self {
        Self {
            peers,
            cache,
            interval,
            status: SyncStatus::default(),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.clone()
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "snapshot sync poller starting");

        loop {
            if shutdown.is_cancelled() {
                info!("snapshot sync poller shutting down");
                return;
            }

            self.sync_all().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("snapshot sync poller shutting down");
                    return;
                }
            }
        }
    }

    /// One sweep over every dataset. Sequential: each peer call may take
    /// minutes and the Coordinator serializes them anyway.
    pub async fn sync_all(&self) {
        self.sync::<Assessments>().await;
        self.sync::<Courses>().await;
        self.sync::<Directory>().await;
        self.sync::<LearnerProgress>().await;
    }

    async fn sync<D>(&self)
    where
        D: PeerDataset,
        D::Record: SnapshotRecord + Send + Sync,
    {
        let result = self.fetch_and_save::<D>().await;
        match &result {
            Ok(summary) => info!(
                peer = D::PEER,
                inserted = summary.inserted,
                updated = summary.updated,
                skipped = summary.skipped,
                "snapshot refreshed"
            ),
            Err(e) => warn!(
                peer = D::PEER,
                kind = e.kind(),
                error = %e,
                "snapshot refresh failed; stale snapshot retained"
            ),
        }
        self.status.record(D::PEER, &result);
    }

    async fn fetch_and_save<D>(&self) -> Result<SaveSummary, RelayError>
    where
        D: PeerDataset,
        D::Record: SnapshotRecord + Send + Sync,
    {
        let records = self.peers.fetch::<D>().await?;
        Ok(self.cache.save_snapshot(&records).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn failure_keeps_previous_success_time() {
        let status = SyncStatus::default();
        status.record("directory", &Ok(SaveSummary::default()));
        let first = status.snapshot()[0].last_success_at;
        assert!(first.is_some());

        let failure: Result<SaveSummary, RelayError> = Err(TransportError::Timeout {
            url: "http://coordinator/api/fill-content-metrics/".to_string(),
        }
        .into());
        status.record("directory", &failure);

        let entries = status.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].last_success_at, first);
        assert!(entries[0].last_error.as_deref().unwrap().contains("timed out"));
    }
}
