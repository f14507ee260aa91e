//! Reservation service: runs commands against the ledger and publishes the
//! resulting state to observers.

use std::collections::BTreeSet;

use broadcast_hub::{BroadcastHub, ConnectionId, ObserverConnection};
use common::{ReservationId, SeatId};
use seat_ledger::{
    LedgerSnapshot, ReleaseOutcome, Reservation, ReservationQuery, SeatLedger, SeatLedgerExt,
};

use crate::commands::{CancelSeat, CreateReservation};
use crate::error::{ReservationError, Result};

/// Service for reserving and releasing seats.
///
/// Every successful mutation is followed by a broadcast of the full
/// reservation state. The broadcast happens after the ledger has committed
/// and released its lock, and its failure never fails the mutation.
pub struct ReservationService<L: SeatLedger> {
    ledger: L,
    hub: BroadcastHub,
}

impl<L: SeatLedger> ReservationService<L> {
    /// Creates a service with a fresh hub.
    pub fn new(ledger: L) -> Self {
        Self::with_hub(ledger, BroadcastHub::new())
    }

    /// Creates a service publishing to an existing hub.
    pub fn with_hub(ledger: L, hub: BroadcastHub) -> Self {
        Self { ledger, hub }
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns the hub observers are registered with.
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Reserves every seat in the command, or none of them.
    #[tracing::instrument(skip(self, cmd), fields(zone = %cmd.zone, seats = cmd.seat_ids.len()))]
    pub async fn create_reservation(&self, cmd: CreateReservation) -> Result<Reservation> {
        let reservation = match self.ledger.reserve(cmd.zone, cmd.seat_ids).await {
            Ok(reservation) => reservation,
            Err(err) => {
                let err = ReservationError::from(err);
                if let ReservationError::SeatsAlreadyReserved { seats } = &err {
                    metrics::counter!("reservation_conflicts_total").increment(1);
                    tracing::info!(?seats, "reservation rejected, seats already held");
                }
                return Err(err);
            }
        };

        metrics::counter!("reservations_created_total").increment(1);
        tracing::info!(reservation_id = %reservation.id, "reservation created");

        self.publish().await;
        Ok(reservation)
    }

    /// Releases one seat. The owning reservation is deleted with its last seat.
    #[tracing::instrument(skip(self, cmd), fields(seat = %cmd.seat_id))]
    pub async fn cancel_seat(&self, cmd: CancelSeat) -> Result<ReleaseOutcome> {
        let outcome = self.ledger.release_seat(&cmd.seat_id).await?;

        metrics::counter!("seats_released_total").increment(1);
        tracing::info!(
            reservation_id = %outcome.reservation_id,
            reservation_deleted = outcome.reservation_deleted,
            "seat released"
        );

        self.publish().await;
        Ok(outcome)
    }

    /// Lists reservations ordered by id.
    #[tracing::instrument(skip(self))]
    pub async fn list_reservations(&self, query: ReservationQuery) -> Result<Vec<Reservation>> {
        Ok(self.ledger.query(query).await?)
    }

    /// Returns every held seat, sorted.
    #[tracing::instrument(skip(self))]
    pub async fn held_seats(&self) -> Result<BTreeSet<SeatId>> {
        Ok(self.ledger.held_seat_ids().await?)
    }

    /// Loads a reservation by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.ledger
            .get(id)
            .await?
            .ok_or(ReservationError::ReservationNotFound(id))
    }

    /// Reads the full reservation state.
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        Ok(self.ledger.snapshot().await?)
    }

    /// Registers an observer. Its first message is the current state.
    #[tracing::instrument(skip_all)]
    pub async fn connect_observer<C: ObserverConnection>(
        &self,
        connection: C,
    ) -> Result<ConnectionId> {
        let snapshot = self.ledger.snapshot().await?;
        Ok(self.hub.register(connection, &snapshot)?)
    }

    /// Removes an observer. Safe to call more than once.
    pub fn disconnect_observer(&self, id: ConnectionId) {
        self.hub.unregister(id);
    }

    /// Pushes the current state to every observer.
    async fn publish(&self) {
        match self.ledger.snapshot().await {
            Ok(snapshot) => self.hub.broadcast(&snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read snapshot for broadcast");
            }
        }
    }
}
