//! Seat ledger: the record of reservations and the one place seat
//! ownership is decided.
//!
//! This crate provides:
//! - [`SeatLedger`] trait with atomic reserve and release operations
//! - [`InMemorySeatLedger`] for tests and single-process deployments
//! - [`PostgresSeatLedger`] persisting reservations with sqlx

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod reservation;
pub mod store;

pub use common::{ReservationId, SeatId, ZoneName};
pub use error::{LedgerError, Result};
pub use memory::InMemorySeatLedger;
pub use postgres::PostgresSeatLedger;
pub use query::ReservationQuery;
pub use reservation::{LedgerSnapshot, ReleaseOutcome, Reservation, Revision};
pub use store::{SeatLedger, SeatLedgerExt, find_conflicts, normalize_request};
