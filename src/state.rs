// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::config::DEFAULT_SERVICE_NAME;
use crate::storage::DbPool;
use crate::sync_poller::SyncStatus;

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub pool: Option<DbPool>,
    pub sync_status: Option<SyncStatus>,
}

impl AppState {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            pool: None,
            sync_status: None,
        }
    }

    pub fn with_pool(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_sync_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}
