use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    LedgerError, LedgerSnapshot, ReleaseOutcome, Reservation, ReservationId, Result, Revision,
    SeatId, ZoneName,
    store::{SeatLedger, normalize_request},
};

#[derive(Debug, Default)]
struct LedgerState {
    reservations: BTreeMap<ReservationId, Reservation>,
    /// Seat -> owning reservation. Kept in lockstep with `reservations`.
    seat_index: HashMap<SeatId, ReservationId>,
    last_id: i64,
    revision: Revision,
}

impl LedgerState {
    fn next_id(&mut self) -> ReservationId {
        self.last_id += 1;
        ReservationId::new(self.last_id)
    }
}

/// In-memory seat ledger.
///
/// Provides the same contract as the PostgreSQL implementation. Every
/// mutation takes the write guard for its whole check-and-write sequence,
/// which serializes writers; reads share the read guard.
#[derive(Clone, Default)]
pub struct InMemorySeatLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemorySeatLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live reservations.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    /// Returns the current revision.
    pub async fn revision(&self) -> Revision {
        self.state.read().await.revision
    }

    /// Clears all reservations. Ids keep increasing.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.reservations.clear();
        state.seat_index.clear();
        state.revision = state.revision.next();
    }
}

#[async_trait]
impl SeatLedger for InMemorySeatLedger {
    #[tracing::instrument(skip(self, zone, seat_ids), fields(zone = %zone, seats = seat_ids.len()))]
    async fn reserve(&self, zone: ZoneName, seat_ids: Vec<SeatId>) -> Result<Reservation> {
        let seat_ids = normalize_request(&zone, seat_ids)?;

        let mut state = self.state.write().await;

        let conflicts: BTreeSet<SeatId> = seat_ids
            .iter()
            .filter(|seat| state.seat_index.contains_key(*seat))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Err(LedgerError::Conflict {
                seats: conflicts.into_iter().collect(),
            });
        }

        let reservation = Reservation {
            id: state.next_id(),
            zone,
            seat_ids,
            reserved_at: Utc::now(),
        };
        for seat in &reservation.seat_ids {
            state.seat_index.insert(seat.clone(), reservation.id);
        }
        state
            .reservations
            .insert(reservation.id, reservation.clone());
        state.revision = state.revision.next();

        Ok(reservation)
    }

    #[tracing::instrument(skip(self, seat_id), fields(seat = %seat_id))]
    async fn release_seat(&self, seat_id: &SeatId) -> Result<ReleaseOutcome> {
        let mut state = self.state.write().await;

        let Some(reservation_id) = state.seat_index.remove(seat_id) else {
            return Err(LedgerError::SeatNotReserved(seat_id.clone()));
        };

        let emptied = match state.reservations.get_mut(&reservation_id) {
            Some(reservation) => {
                reservation.seat_ids.retain(|s| s != seat_id);
                reservation.seat_ids.is_empty()
            }
            None => false,
        };
        if emptied {
            state.reservations.remove(&reservation_id);
        }
        state.revision = state.revision.next();

        Ok(ReleaseOutcome {
            seat_id: seat_id.clone(),
            reservation_id,
            reservation_deleted: emptied,
        })
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.state.read().await.reservations.get(&id).cloned())
    }

    async fn list_all(&self, offset: usize, limit: usize) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_by_zone(&self, zone: &ZoneName) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| &r.zone == zone)
            .cloned()
            .collect())
    }

    async fn held_seat_ids(&self) -> Result<BTreeSet<SeatId>> {
        let state = self.state.read().await;
        Ok(state.seat_index.keys().cloned().collect())
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let state = self.state.read().await;
        Ok(LedgerSnapshot {
            revision: state.revision,
            reservations: state.reservations.values().cloned().collect(),
        })
    }
}
