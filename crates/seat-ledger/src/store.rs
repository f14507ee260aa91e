use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;

use crate::{
    LedgerError, LedgerSnapshot, ReleaseOutcome, Reservation, ReservationId, ReservationQuery,
    Result, SeatId, ZoneName,
};

/// Core trait for seat ledger implementations.
///
/// A ledger is the durable record of reservations and the only place the
/// one-owner-per-seat invariant is enforced. Every mutating call runs as a
/// single atomic unit with respect to every other mutating call.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Creates a reservation holding exactly the requested seats.
    ///
    /// Fails with `Conflict` naming every requested seat that is already
    /// held (sorted) and creates nothing in that case. Duplicate seats in
    /// the request are collapsed to their first occurrence.
    async fn reserve(&self, zone: ZoneName, seat_ids: Vec<SeatId>) -> Result<Reservation>;

    /// Removes one seat from the reservation holding it.
    ///
    /// Deletes the reservation when its last seat is released. Fails with
    /// `SeatNotReserved` and changes nothing if no reservation holds the seat.
    async fn release_seat(&self, seat_id: &SeatId) -> Result<ReleaseOutcome>;

    /// Looks up a single reservation.
    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Lists reservations ordered by id.
    async fn list_all(&self, offset: usize, limit: usize) -> Result<Vec<Reservation>>;

    /// Lists every reservation in a zone, ordered by id.
    async fn list_by_zone(&self, zone: &ZoneName) -> Result<Vec<Reservation>>;

    /// Returns the union of all held seats.
    async fn held_seat_ids(&self) -> Result<BTreeSet<SeatId>>;

    /// Reads all reservations together with the revision they reflect.
    async fn snapshot(&self) -> Result<LedgerSnapshot>;
}

/// Extension trait providing convenience methods for seat ledgers.
#[async_trait]
pub trait SeatLedgerExt: SeatLedger {
    /// Runs a listing query. A zone filter ignores pagination.
    async fn query(&self, query: ReservationQuery) -> Result<Vec<Reservation>> {
        match query.zone {
            Some(ref zone) => self.list_by_zone(zone).await,
            None => self.list_all(query.offset, query.limit).await,
        }
    }

    /// Checks whether any reservation currently holds the seat.
    async fn is_held(&self, seat_id: &SeatId) -> Result<bool> {
        Ok(self.held_seat_ids().await?.contains(seat_id))
    }
}

// Blanket implementation for all SeatLedger implementations
impl<T: SeatLedger + ?Sized> SeatLedgerExt for T {}

/// Validates a reservation request and drops duplicate seats.
///
/// Returns the seats in request order with later duplicates removed.
pub fn normalize_request(zone: &ZoneName, seat_ids: Vec<SeatId>) -> Result<Vec<SeatId>> {
    if zone.is_empty() {
        return Err(LedgerError::InvalidRequest(
            "zone must not be empty".to_string(),
        ));
    }
    if seat_ids.is_empty() {
        return Err(LedgerError::InvalidRequest(
            "at least one seat is required".to_string(),
        ));
    }
    if seat_ids.iter().any(SeatId::is_empty) {
        return Err(LedgerError::InvalidRequest(
            "seat identifiers must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(seat_ids.len());
    Ok(seat_ids
        .into_iter()
        .filter(|seat| seen.insert(seat.clone()))
        .collect())
}

/// Intersects the requested seats with the held ones, sorted.
pub fn find_conflicts(held: &BTreeSet<SeatId>, requested: &[SeatId]) -> Vec<SeatId> {
    requested
        .iter()
        .filter(|seat| held.contains(*seat))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
