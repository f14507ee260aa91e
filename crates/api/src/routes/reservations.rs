//! Reservation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ReservationId, SeatId, ZoneName};
use reservations::{CancelSeat, CreateReservation, ReservationService};
use seat_ledger::{ReleaseOutcome, Reservation, ReservationQuery, SeatLedger};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<L: SeatLedger> {
    pub service: ReservationService<L>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub zone: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl From<ListParams> for ReservationQuery {
    fn from(params: ListParams) -> Self {
        let mut query = ReservationQuery::new();
        if let Some(zone) = params.zone {
            query = query.zone(zone);
        }
        if let Some(skip) = params.skip {
            query = query.offset(skip);
        }
        if let Some(limit) = params.limit {
            query = query.limit(limit);
        }
        query
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: ReservationId,
    pub zone: ZoneName,
    pub seat_identifiers: Vec<SeatId>,
    pub reserved_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: reservation.id,
            zone: reservation.zone,
            seat_identifiers: reservation.seat_ids,
            reserved_at: reservation.reserved_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub seat_identifier: SeatId,
    pub reservation_id: ReservationId,
    pub deleted_reservation: bool,
}

impl From<ReleaseOutcome> for CancelResponse {
    fn from(outcome: ReleaseOutcome) -> Self {
        let message = if outcome.reservation_deleted {
            format!(
                "Reservation {} was deleted as seat '{}' was its last seat",
                outcome.reservation_id, outcome.seat_id
            )
        } else {
            format!(
                "Seat '{}' was removed from reservation {}",
                outcome.seat_id, outcome.reservation_id
            )
        };

        Self {
            message,
            seat_identifier: outcome.seat_id,
            reservation_id: outcome.reservation_id,
            deleted_reservation: outcome.reservation_deleted,
        }
    }
}

// -- Handlers --

/// POST /reservations: reserve every requested seat or none.
#[tracing::instrument(skip(state, cmd))]
pub async fn create<L: SeatLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(cmd): Json<CreateReservation>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let reservation = state.service.create_reservation(cmd).await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// GET /reservations: list reservations, optionally for one zone.
#[tracing::instrument(skip(state))]
pub async fn list<L: SeatLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let reservations = state.service.list_reservations(params.into()).await?;
    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}

/// GET /reservations/seats: every held seat identifier, sorted.
#[tracing::instrument(skip(state))]
pub async fn held_seats<L: SeatLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Vec<SeatId>>, ApiError> {
    let seats = state.service.held_seats().await?;
    Ok(Json(seats.into_iter().collect()))
}

/// GET /reservations/:id: load one reservation.
#[tracing::instrument(skip(state))]
pub async fn get<L: SeatLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let id = parse_reservation_id(&id)?;
    let reservation = state.service.get_reservation(id).await?;
    Ok(Json(reservation.into()))
}

/// DELETE /reservations/seats/:seat_id: release one seat.
#[tracing::instrument(skip(state))]
pub async fn cancel_seat<L: SeatLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(seat_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let outcome = state.service.cancel_seat(CancelSeat::new(seat_id)).await?;
    Ok(Json(outcome.into()))
}

// -- Helpers --

fn parse_reservation_id(id: &str) -> Result<ReservationId, ApiError> {
    id.parse::<i64>()
        .map(ReservationId::new)
        .map_err(|e| ApiError::BadRequest(format!("Invalid reservation id '{id}': {e}")))
}
