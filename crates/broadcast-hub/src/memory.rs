//! In-process observer connection backed by a tokio channel.
//!
//! Useful for tests and for embedding the hub without a network transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{DeliveryError, ObserverConnection, WireMessage};

/// Sending half, handed to [`BroadcastHub::register`](crate::BroadcastHub::register).
pub struct ChannelConnection {
    sender: Option<mpsc::UnboundedSender<Arc<str>>>,
    closed: Arc<AtomicBool>,
}

/// Receiving half, held by whoever plays the observer.
pub struct ChannelReceiver {
    receiver: mpsc::UnboundedReceiver<Arc<str>>,
    closed: Arc<AtomicBool>,
}

impl ChannelConnection {
    /// Creates a connected pair.
    pub fn pair() -> (ChannelConnection, ChannelReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            ChannelConnection {
                sender: Some(sender),
                closed: closed.clone(),
            },
            ChannelReceiver { receiver, closed },
        )
    }
}

#[async_trait]
impl ObserverConnection for ChannelConnection {
    async fn send(&mut self, message: Arc<str>) -> Result<(), DeliveryError> {
        match &self.sender {
            Some(sender) => sender.send(message).map_err(|_| DeliveryError::Closed),
            None => Err(DeliveryError::Closed),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the sender ends the receiver's stream
        self.sender = None;
    }
}

impl ChannelReceiver {
    /// Waits for the next raw message. `None` once the hub closed the connection.
    pub async fn next_raw(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    /// Waits for and decodes the next message.
    ///
    /// Returns `None` once the connection is closed. Undecodable messages
    /// are skipped.
    pub async fn next_message(&mut self) -> Option<WireMessage> {
        while let Some(raw) = self.receiver.recv().await {
            match serde_json::from_str(&raw) {
                Ok(message) => return Some(message),
                Err(err) => tracing::warn!(error = %err, "skipping undecodable message"),
            }
        }
        None
    }

    /// Returns a message if one is already queued, without waiting.
    pub fn try_next_message(&mut self) -> Option<WireMessage> {
        let raw = self.receiver.try_recv().ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// True once the hub has closed the sending side.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
