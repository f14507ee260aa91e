//! Observer WebSocket endpoint.
//!
//! Each socket is registered with the broadcast hub and receives the full
//! reservation state on connect and after every change. Inbound frames are
//! read only to notice the peer going away.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use broadcast_hub::{DeliveryError, ObserverConnection};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use seat_ledger::SeatLedger;

use super::reservations::AppState;

/// Sending half of a WebSocket, owned by the hub once registered.
pub struct WsObserver {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ObserverConnection for WsObserver {
    async fn send(&mut self, message: Arc<str>) -> Result<(), DeliveryError> {
        self.sink
            .send(Message::Text(message.as_ref().into()))
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        // The peer may already be gone
        let _ = self.sink.close().await;
    }
}

/// GET /ws: upgrade to an observer connection.
pub async fn upgrade<L: SeatLedger + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<L>>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<L: SeatLedger + 'static>(socket: WebSocket, state: Arc<AppState<L>>) {
    let (sink, mut stream) = socket.split();

    let id = match state.service.connect_observer(WsObserver { sink }).await {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(error = %err, "could not register observer");
            return;
        }
    };
    tracing::info!(connection_id = %id, "observer connected");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(connection_id = %id, error = %err, "observer read failed");
                break;
            }
        }
    }

    state.service.disconnect_observer(id);
    tracing::info!(connection_id = %id, "observer disconnected");
}
