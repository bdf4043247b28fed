// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use relational_reporting_server::{
    api::router,
    config::AppConfig,
    coordinator::{EnvelopeClient, ServiceRegistrar},
    identity::ServiceIdentity,
    peers::PeerClient,
    state::AppState,
    storage::{create_pool, run_migrations, SeedCoordinator, SnapshotCache},
    sync_poller::SyncPoller,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received. Shutting down...");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().expect("Invalid configuration");
    init_tracing(config.json_logs);
    info!(?config, "configuration loaded");

    // Signing identity and Coordinator client (missing key or URL is fatal)
    let identity = Arc::new(ServiceIdentity::from_config(&config).expect("Failed to load signing identity"));
    let envelope = EnvelopeClient::from_config(&config, identity.clone())
        .expect("Failed to configure Coordinator client");

    // Database
    let database_url = config
        .require_database_url()
        .expect("DATABASE_URL is required");
    let pool = create_pool(database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");
    run_migrations(&pool).await.expect("Failed to run migrations");

    // Reference data; never fatal
    SeedCoordinator::new(pool.clone())
        .run(config.seed_strategy)
        .await;

    // Registration is advisory and runs in the background
    ServiceRegistrar::new(envelope.clone(), &config).spawn();

    let shutdown = CancellationToken::new();
    let poller = SyncPoller::new(
        PeerClient::new(envelope),
        SnapshotCache::new(pool.clone()),
        config.snapshot_sync_interval,
    );
    let sync_status = poller.status();
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));

    let state = AppState::new(config.service_name.clone())
        .with_pool(pool)
        .with_sync_status(sync_status);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    info!(%addr, service = %config.service_name, "Reporting service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    let _ = poller_handle.await;
    info!("Server shut down.");
}
