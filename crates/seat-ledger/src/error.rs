use thiserror::Error;

use crate::SeatId;

/// Errors that can occur when interacting with the seat ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// One or more requested seats are already held by another reservation.
    /// Lists every colliding seat, sorted.
    #[error("Seats already reserved: {}", join_seats(.seats))]
    Conflict { seats: Vec<SeatId> },

    /// No reservation currently holds the seat.
    #[error("Seat '{0}' is not currently reserved")]
    SeatNotReserved(SeatId),

    /// The request failed validation before touching the store.
    #[error("Invalid reservation request: {0}")]
    InvalidRequest(String),

    /// A database error occurred. Nothing was written, so the whole
    /// operation can be retried.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Returns true if the error came from the storage layer rather than
    /// from the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Database(_))
    }
}

fn join_seats(seats: &[SeatId]) -> String {
    seats
        .iter()
        .map(SeatId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_lists_every_seat() {
        let err = LedgerError::Conflict {
            seats: vec![SeatId::from("A2"), SeatId::from("A3")],
        };
        assert_eq!(err.to_string(), "Seats already reserved: A2, A3");
        assert!(!err.is_transient());
    }

    #[test]
    fn database_errors_are_transient() {
        let err = LedgerError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }
}
