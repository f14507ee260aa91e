use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ReservationId, SeatId, ZoneName};

/// A committed reservation: one zone, one or more seats, owned exclusively
/// by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Ledger-assigned identifier.
    pub id: ReservationId,

    /// Zone the seats were reserved in.
    pub zone: ZoneName,

    /// Seats held by this reservation, in request order, no duplicates.
    pub seat_ids: Vec<SeatId>,

    /// When the reservation was created.
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    /// Number of seats still held.
    pub fn seat_count(&self) -> usize {
        self.seat_ids.len()
    }
}

/// Result of releasing a single seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    /// The seat that was released.
    pub seat_id: SeatId,

    /// The reservation that held the seat.
    pub reservation_id: ReservationId,

    /// True when the released seat was the last one and the reservation
    /// was deleted.
    pub reservation_deleted: bool,
}

/// Ledger revision, bumped once per committed mutation.
///
/// Revisions order snapshots by commit order: a snapshot with a higher
/// revision reflects every mutation a lower one does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// Creates a revision from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Revision of an empty ledger that has never been mutated.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next revision.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw revision value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The full set of current reservations, read consistently at one revision.
///
/// Snapshots are never stored; they are recomputed from the ledger on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Revision the snapshot reflects.
    pub revision: Revision,

    /// All current reservations, ordered by id.
    pub reservations: Vec<Reservation>,
}

impl LedgerSnapshot {
    /// Snapshot of a ledger with no mutations.
    pub fn empty() -> Self {
        Self {
            revision: Revision::initial(),
            reservations: Vec::new(),
        }
    }

    /// Union of every reservation's seats, sorted.
    pub fn held_seat_ids(&self) -> BTreeSet<SeatId> {
        self.reservations
            .iter()
            .flat_map(|r| r.seat_ids.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}
