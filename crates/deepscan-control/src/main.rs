// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deepscan Control - Scan Lifecycle Engine
//!
//! The control plane accepts scan requests, dispatches each as an
//! isolated workload onto the cluster, tracks workloads to terminal
//! states, ingests findings, and reclaims resources under retention.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use deepscan_control::config::Config;
use deepscan_control::runtime::ControlRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deepscan_control=info".into()),
        )
        .init();

    info!("Starting Deepscan Control");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        scan_api_port = config.server.scan_api_port,
        ops_port = config.server.ops_port,
        workload_namespace = %config.workload.namespace,
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url())
        .await?;

    // Verify connection
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    // Start workers and servers
    let runtime = ControlRuntime::start(config, pool).await?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await;

    Ok(())
}
