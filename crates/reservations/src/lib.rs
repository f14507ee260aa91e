//! Reservation service.
//!
//! Ties the seat ledger to the broadcast hub:
//! - [`CreateReservation`] and [`CancelSeat`] commands
//! - [`ReservationService`] running them and publishing the resulting state
//! - [`ReservationError`] as seen by callers

pub mod commands;
pub mod error;
pub mod service;

pub use commands::{CancelSeat, CreateReservation};
pub use error::{ReservationError, Result};
pub use service::ReservationService;
