//! Observer fan-out for reservation state.
//!
//! This crate keeps every connected observer's view of the reservations in
//! step with the ledger:
//! - [`ObserverConnection`] trait implemented by transports (WebSocket, test channels)
//! - [`BroadcastHub`] tracking live connections and pushing full snapshots
//! - [`WireMessage`] envelope sent to observers

pub mod connection;
pub mod error;
pub mod hub;
pub mod memory;
pub mod message;

pub use common::ConnectionId;
pub use connection::{ConnectionState, ObserverConnection};
pub use error::{DeliveryError, HubError};
pub use hub::BroadcastHub;
pub use memory::{ChannelConnection, ChannelReceiver};
pub use message::{MessageType, ReservationPayload, SeatPayload, WireMessage};
