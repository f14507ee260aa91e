//! Liveness and Prometheus endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use seat_ledger::SeatLedger;
use serde::Serialize;

use super::reservations::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub observers: usize,
}

/// GET /health
pub async fn health<L: SeatLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        observers: state.service.hub().active_connections(),
    })
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
