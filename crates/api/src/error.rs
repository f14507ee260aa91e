//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reservations::ReservationError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Reservation service error.
    Reservation(ReservationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Reservation(err) => reservation_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "error": message.into() })
}

fn reservation_error_to_response(err: ReservationError) -> (StatusCode, serde_json::Value) {
    match &err {
        ReservationError::SeatsAlreadyReserved { seats } => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string(), "seats": seats }),
        ),
        ReservationError::SeatNotReserved(seat) => (
            StatusCode::NOT_FOUND,
            error_body(format!("Seat '{seat}' is not currently reserved")),
        ),
        ReservationError::ReservationNotFound(_) => {
            (StatusCode::NOT_FOUND, error_body(err.to_string()))
        }
        ReservationError::InvalidRequest(_) => {
            (StatusCode::BAD_REQUEST, error_body(err.to_string()))
        }
        ReservationError::Store(_) | ReservationError::Observer(_) => {
            tracing::error!(error = %err, retryable = err.is_retryable(), "reservation request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("An internal error occurred while processing the reservation"),
            )
        }
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        ApiError::Reservation(err)
    }
}
