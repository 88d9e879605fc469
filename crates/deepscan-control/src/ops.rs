// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operational HTTP endpoints.
//!
//! Liveness, readiness, and a text metrics exposition. Required for
//! deployment but not part of the scan lifecycle itself.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use crate::persistence::postgres;

/// Shared state for the ops endpoints.
pub struct OpsState {
    pub pool: PgPool,
    pub version: String,
}

impl OpsState {
    /// Create new ops state over the store's pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Build the operational router.
pub fn router(state: Arc<OpsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the operational endpoints until the process exits.
pub async fn serve(port: u16, state: Arc<OpsState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port = port, "Ops HTTP server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Liveness probe.
async fn health(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "deepscan-control",
        "version": state.version,
    }))
}

/// Readiness probe; includes a store round trip.
async fn ready(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    if postgres::health_check_db(&state.pool).await {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not ready", "reason": "database unreachable"})),
        )
    }
}

/// Prometheus text exposition: build info plus scan counts by status.
async fn metrics(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    let mut body = String::new();
    body.push_str("# HELP deepscan_control_info Build info\n");
    body.push_str("# TYPE deepscan_control_info gauge\n");
    body.push_str(&format!(
        "deepscan_control_info{{version=\"{}\"}} 1\n",
        state.version
    ));

    if let Ok(counts) = postgres::count_scans_by_status(&state.pool).await {
        body.push_str("# HELP deepscan_scans_total Scans by status\n");
        body.push_str("# TYPE deepscan_scans_total gauge\n");
        for (status, count) in counts {
            body.push_str(&format!(
                "deepscan_scans_total{{status=\"{}\"}} {}\n",
                status, count
            ));
        }
    }

    (
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}
