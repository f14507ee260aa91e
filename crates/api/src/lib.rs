//! HTTP and WebSocket server for seat reservations.
//!
//! Exposes the reservation service over REST, pushes live reservation state
//! to WebSocket observers, and reports structured logs (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get};
use metrics_exporter_prometheus::PrometheusHandle;
use reservations::ReservationService;
use seat_ledger::SeatLedger;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: SeatLedger + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<L>))
        .route(
            "/reservations",
            get(routes::reservations::list::<L>).post(routes::reservations::create::<L>),
        )
        .route(
            "/reservations/seats",
            get(routes::reservations::held_seats::<L>),
        )
        .route(
            "/reservations/seats/{seat_id}",
            delete(routes::reservations::cancel_seat::<L>),
        )
        .route("/reservations/{id}", get(routes::reservations::get::<L>))
        .route("/ws", get(routes::ws::upgrade::<L>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state around a ledger.
pub fn create_state<L: SeatLedger + 'static>(ledger: L) -> Arc<AppState<L>> {
    Arc::new(AppState {
        service: ReservationService::new(ledger),
    })
}
