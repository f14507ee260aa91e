//! Observer connection trait and lifecycle states.

use std::sync::Arc;

use async_trait::async_trait;

use crate::DeliveryError;

/// Lifecycle of an observer connection inside the hub.
///
/// `Connecting` until its initial snapshot has been delivered, `Active`
/// afterwards, `Closed` once it is unregistered or a send fails. Closed is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

impl ConnectionState {
    /// Returns true while the hub still queues messages for the connection.
    pub fn is_open(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active => "active",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A live channel to one observer, supplied by the transport layer.
///
/// The hub owns the connection once registered and drives it from a
/// dedicated task, so a slow peer only ever delays itself.
#[async_trait]
pub trait ObserverConnection: Send + 'static {
    /// Sends one already-serialized message.
    async fn send(&mut self, message: Arc<str>) -> Result<(), DeliveryError>;

    /// Closes the channel. Called once, after the last send attempt.
    async fn close(&mut self) {}
}
