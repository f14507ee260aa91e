//! HTTP and WebSocket route handlers.

pub mod reservations;
pub mod system;
pub mod ws;

pub use reservations::AppState;
