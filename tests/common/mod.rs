// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

#![allow(dead_code)]

use relational_reporting_server::storage::{create_pool, run_migrations, DbPool};
use sqlx::{Connection, Executor, PgConnection};
use uuid::Uuid;

/// Create an isolated, migrated database on the server at `DATABASE_URL`.
pub async fn fresh_pool() -> DbPool {
    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a Postgres server");
    let mut admin = PgConnection::connect(&base_url)
        .await
        .expect("Failed to connect to Postgres");

    let db_name = format!("reporting_test_{}", Uuid::new_v4().simple());
    admin
        .execute(format!(r#"CREATE DATABASE "{db_name}""#).as_str())
        .await
        .expect("Failed to create test database");

    let db_url = match base_url.rfind('/') {
        Some(pos) => format!("{}/{}", &base_url[..pos], db_name),
        None => format!("{base_url}/{db_name}"),
    };

    let pool = create_pool(&db_url, 5)
        .await
        .expect("Failed to connect to test database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}
