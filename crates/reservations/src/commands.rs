//! Reservation commands.

use common::{SeatId, ZoneName};
use serde::Deserialize;

/// Command to reserve a set of seats in one zone.
///
/// Deserializes from the request body `{ "zone", "seat_identifiers" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateReservation {
    /// Zone the seats belong to.
    pub zone: ZoneName,

    /// Seats to hold, in request order.
    #[serde(rename = "seat_identifiers")]
    pub seat_ids: Vec<SeatId>,
}

impl CreateReservation {
    /// Creates a new CreateReservation command.
    pub fn new(zone: impl Into<ZoneName>, seat_ids: Vec<SeatId>) -> Self {
        Self {
            zone: zone.into(),
            seat_ids,
        }
    }

    /// Creates a command from plain seat strings.
    pub fn with_seats<I, S>(zone: impl Into<ZoneName>, seats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SeatId>,
    {
        Self::new(zone, seats.into_iter().map(Into::into).collect())
    }
}

/// Command to release a single seat from whichever reservation holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSeat {
    pub seat_id: SeatId,
}

impl CancelSeat {
    /// Creates a new CancelSeat command.
    pub fn new(seat_id: impl Into<SeatId>) -> Self {
        Self {
            seat_id: seat_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_deserializes_from_request_body() {
        let cmd: CreateReservation = serde_json::from_str(
            r#"{ "zone": "Orchestra", "seat_identifiers": ["A1", "A2"] }"#,
        )
        .unwrap();

        assert_eq!(cmd, CreateReservation::with_seats("Orchestra", ["A1", "A2"]));
    }

    #[test]
    fn create_requires_seat_identifiers() {
        let result = serde_json::from_str::<CreateReservation>(r#"{ "zone": "A" }"#);
        assert!(result.is_err());
    }
}
