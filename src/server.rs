// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Liveness and readiness probes.
//!
//! - `/healthz` always answers 200 while the process runs
//! - `/readyz` answers 200 once every control loop's cache has synced, 503 before

use crate::controller::Readiness;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub fn router(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(readiness)
}

/// Serve the probes on `addr` until `shutdown` fires
pub async fn serve(
    addr: &str,
    readiness: Readiness,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Probe server listening on {}", addr);

    axum::serve(listener, router(readiness))
        .with_graceful_shutdown(async move {
            crate::leader::elector::shutdown_requested(&mut shutdown).await;
        })
        .await?;
    Ok(())
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(readiness): State<Readiness>) -> impl IntoResponse {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
