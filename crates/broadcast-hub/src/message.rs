//! Wire format pushed to observers.

use std::sync::Arc;

use seat_ledger::{LedgerSnapshot, Reservation, ReservationId, SeatId};
use serde::{Deserialize, Serialize};

/// Kind of message in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Sent once to each newly registered observer.
    InitialState,
    /// Sent after every committed mutation.
    ReservationUpdate,
}

/// One seat inside a reservation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatPayload {
    pub identifier: SeatId,
}

/// A reservation as observers see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPayload {
    pub id: ReservationId,
    pub zone: String,
    pub seats: Vec<SeatPayload>,
}

impl From<&Reservation> for ReservationPayload {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id,
            zone: reservation.zone.to_string(),
            seats: reservation
                .seat_ids
                .iter()
                .map(|seat| SeatPayload {
                    identifier: seat.clone(),
                })
                .collect(),
        }
    }
}

/// Envelope `{ "type": ..., "data": [...] }` carrying the full reservation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub data: Vec<ReservationPayload>,
}

impl WireMessage {
    /// Builds a message carrying every reservation in the snapshot.
    pub fn from_snapshot(kind: MessageType, snapshot: &LedgerSnapshot) -> Self {
        Self {
            kind,
            data: snapshot
                .reservations
                .iter()
                .map(ReservationPayload::from)
                .collect(),
        }
    }

    /// Serializes the message once for sharing across connections.
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }

    /// Seats held across every reservation in the message.
    pub fn seat_ids(&self) -> Vec<SeatId> {
        self.data
            .iter()
            .flat_map(|r| r.seats.iter().map(|s| s.identifier.clone()))
            .collect()
    }
}
