//! Hub error types.

use thiserror::Error;

/// A single send to one observer failed.
///
/// Always handled inside the hub by evicting that observer.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The peer is gone.
    #[error("Connection closed")]
    Closed,

    /// The transport reported an error.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors returned from hub registration.
#[derive(Debug, Error)]
pub enum HubError {
    /// The snapshot could not be encoded for the wire.
    #[error("Failed to encode message: {0}")]
    Encoding(#[from] serde_json::Error),
}
