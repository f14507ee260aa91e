//! Reservation service error types.

use broadcast_hub::HubError;
use common::{ReservationId, SeatId};
use seat_ledger::LedgerError;
use thiserror::Error;

/// Errors returned to callers of the reservation service.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Some requested seats are held by another reservation. Nothing was created.
    #[error("{}", conflict_message(.seats))]
    SeatsAlreadyReserved { seats: Vec<SeatId> },

    /// No reservation holds the seat being cancelled.
    #[error("Seat '{0}' is not reserved")]
    SeatNotReserved(SeatId),

    /// No reservation with this id exists.
    #[error("Reservation {0} not found")]
    ReservationNotFound(ReservationId),

    /// The request was rejected before reaching the ledger.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The ledger's backing store failed. Nothing was written.
    #[error("Storage error: {0}")]
    Store(LedgerError),

    /// An observer could not be registered with the hub.
    #[error("Observer registration failed: {0}")]
    Observer(#[from] HubError),
}

impl ReservationError {
    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReservationError::Store(_))
    }
}

impl From<LedgerError> for ReservationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict { seats } => ReservationError::SeatsAlreadyReserved { seats },
            LedgerError::SeatNotReserved(seat) => ReservationError::SeatNotReserved(seat),
            LedgerError::InvalidRequest(reason) => ReservationError::InvalidRequest(reason),
            other => ReservationError::Store(other),
        }
    }
}

fn conflict_message(seats: &[SeatId]) -> String {
    let seats: Vec<&str> = seats.iter().map(SeatId::as_str).collect();
    format!("Seats already reserved: {}", seats.join(", "))
}

/// Result type for reservation service operations.
pub type Result<T> = std::result::Result<T, ReservationError>;
