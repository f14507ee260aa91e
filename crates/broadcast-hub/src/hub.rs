//! Broadcast hub: the set of live observers and the fan-out to them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use common::ConnectionId;
use seat_ledger::{LedgerSnapshot, Revision};
use tokio::sync::mpsc;

use crate::connection::{ConnectionState, ObserverConnection};
use crate::error::HubError;
use crate::message::{MessageType, WireMessage};

type Outbox = mpsc::UnboundedSender<Arc<str>>;
type SharedState = Arc<Mutex<ConnectionState>>;

struct Entry {
    outbox: Outbox,
    state: SharedState,
    /// Newest revision queued to this connection.
    revision: Revision,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Entry>,
    /// Most recent update queued to observers, kept so late joiners can
    /// catch up if their snapshot predates it.
    last_update: Option<(Revision, Arc<str>)>,
}

/// Tracks live observer connections and pushes reservation snapshots to them.
///
/// Every connection gets its own FIFO queue drained by a dedicated task, so
/// delivery to one observer never waits on another. The connection set is
/// behind a mutex that is only held for non-blocking queue pushes and is
/// never held across an `.await`.
///
/// Delivery is at-most-once and best effort: a failed send evicts that
/// connection and is never reported to the caller.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<Mutex<HubState>>,
}

impl BroadcastHub {
    /// Creates a hub with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        lock_state(&self.inner)
    }

    /// Registers a connection and queues its initial snapshot.
    ///
    /// The initial state is queued before the connection joins the active
    /// set, so it is always the first message the observer sees. If a newer
    /// update than `snapshot` was already broadcast, that update is queued
    /// right after it.
    #[tracing::instrument(skip_all, fields(revision = %snapshot.revision))]
    pub fn register<C: ObserverConnection>(
        &self,
        connection: C,
        snapshot: &LedgerSnapshot,
    ) -> Result<ConnectionId, HubError> {
        let initial = WireMessage::from_snapshot(MessageType::InitialState, snapshot).encode()?;

        let id = ConnectionId::new();
        let (outbox, inbox) = mpsc::unbounded_channel();
        let state: SharedState = Arc::new(Mutex::new(ConnectionState::Connecting));

        let active = {
            let mut hub = self.lock();
            // The receiver is alive until the task below exits
            let _ = outbox.send(initial);
            let mut queued = snapshot.revision;
            if let Some((revision, update)) = &hub.last_update
                && *revision > snapshot.revision
            {
                let _ = outbox.send(update.clone());
                queued = *revision;
            }
            hub.connections.insert(
                id,
                Entry {
                    outbox,
                    state: state.clone(),
                    revision: queued,
                },
            );
            hub.connections.len()
        };
        metrics::gauge!("observers_active").set(active as f64);
        tracing::info!(connection_id = %id, active, "observer registered");

        tokio::spawn(deliver(
            id,
            Box::new(connection),
            inbox,
            state,
            Arc::downgrade(&self.inner),
        ));

        Ok(id)
    }

    /// Queues a snapshot to every active connection.
    ///
    /// The snapshot is serialized once. Snapshots that are not newer than
    /// the last broadcast are dropped, and a connection is skipped when it
    /// already has this revision or a newer one queued, so each connection's
    /// stream stays in commit order when broadcasts race. Never fails.
    #[tracing::instrument(skip_all, fields(revision = %snapshot.revision))]
    pub fn broadcast(&self, snapshot: &LedgerSnapshot) {
        let message =
            match WireMessage::from_snapshot(MessageType::ReservationUpdate, snapshot).encode() {
                Ok(message) => message,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode reservation update");
                    return;
                }
            };

        let mut hub = self.lock();
        if let Some((last, _)) = &hub.last_update
            && snapshot.revision <= *last
        {
            tracing::debug!(last = %last, "dropping stale snapshot");
            return;
        }
        hub.last_update = Some((snapshot.revision, message.clone()));

        let mut gone = Vec::new();
        let mut delivered = 0usize;
        for (id, entry) in hub.connections.iter_mut() {
            if entry.revision >= snapshot.revision {
                continue;
            }
            if entry.outbox.send(message.clone()).is_err() {
                gone.push(*id);
            } else {
                entry.revision = snapshot.revision;
                delivered += 1;
            }
        }
        for id in &gone {
            if let Some(entry) = hub.connections.remove(id) {
                set_state(&entry.state, ConnectionState::Closed);
            }
        }
        let active = hub.connections.len();
        drop(hub);

        if !gone.is_empty() {
            metrics::counter!("observers_evicted_total").increment(gone.len() as u64);
            metrics::gauge!("observers_active").set(active as f64);
        }
        tracing::debug!(delivered_to = delivered, evicted = gone.len(), "update queued");
    }

    /// Removes a connection. Messages already queued are still delivered
    /// before the connection is closed. Returns false if it was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let (removed, active) = {
            let mut hub = self.lock();
            let removed = hub.connections.remove(&id);
            (removed, hub.connections.len())
        };

        match removed {
            Some(_) => {
                metrics::gauge!("observers_active").set(active as f64);
                tracing::info!(connection_id = %id, active, "observer unregistered");
                true
            }
            None => false,
        }
    }

    /// Drops every connection; each one is closed after its queue drains.
    pub fn close_all(&self) {
        let closed = {
            let mut hub = self.lock();
            let count = hub.connections.len();
            hub.connections.clear();
            count
        };
        metrics::gauge!("observers_active").set(0.0);
        tracing::info!(closed, "all observers released");
    }

    /// Number of connections in the active set.
    pub fn active_connections(&self) -> usize {
        self.lock().connections.len()
    }

    /// Current state of a connection. Unknown ids are reported as closed.
    pub fn connection_state(&self, id: ConnectionId) -> ConnectionState {
        match self.lock().connections.get(&id) {
            Some(entry) => *lock_state(&entry.state),
            None => ConnectionState::Closed,
        }
    }

    /// Revision of the last snapshot queued by [`broadcast`](Self::broadcast).
    pub fn last_revision(&self) -> Option<Revision> {
        self.lock().last_update.as_ref().map(|(revision, _)| *revision)
    }
}

fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(state: &Mutex<ConnectionState>, next: ConnectionState) {
    let mut current = lock_state(state);
    if current.is_open() {
        *current = next;
    }
}

/// Drains one connection's queue until it is unregistered or a send fails.
async fn deliver(
    id: ConnectionId,
    mut connection: Box<dyn ObserverConnection>,
    mut inbox: mpsc::UnboundedReceiver<Arc<str>>,
    state: SharedState,
    hub: Weak<Mutex<HubState>>,
) {
    while let Some(message) = inbox.recv().await {
        if let Err(err) = connection.send(message).await {
            tracing::warn!(connection_id = %id, error = %err, "delivery failed, evicting observer");
            metrics::counter!("observers_evicted_total").increment(1);
            if let Some(hub) = hub.upgrade() {
                let active = {
                    let mut hub = lock_state(&hub);
                    hub.connections.remove(&id);
                    hub.connections.len()
                };
                metrics::gauge!("observers_active").set(active as f64);
            }
            break;
        }
        set_state(&state, ConnectionState::Active);
    }

    set_state(&state, ConnectionState::Closed);
    // Nothing more is sent once the connection is closed
    inbox.close();
    connection.close().await;
    tracing::debug!(connection_id = %id, "observer closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ChannelConnection;
    use crate::{DeliveryError, WireMessage};
    use async_trait::async_trait;
    use chrono::Utc;
    use seat_ledger::{Reservation, ReservationId, SeatId, ZoneName};
    use std::time::Duration;

    fn snapshot(revision: i64, seats: &[&str]) -> LedgerSnapshot {
        let reservations = if seats.is_empty() {
            vec![]
        } else {
            vec![Reservation {
                id: ReservationId::first(),
                zone: ZoneName::from("A"),
                seat_ids: seats.iter().map(|s| SeatId::from(*s)).collect(),
                reserved_at: Utc::now(),
            }]
        };
        LedgerSnapshot {
            revision: Revision::new(revision),
            reservations,
        }
    }

    fn seat_ids(message: &WireMessage) -> Vec<String> {
        message
            .seat_ids()
            .into_iter()
            .map(SeatId::into_inner)
            .collect()
    }

    /// Connection whose every send fails.
    struct BrokenConnection;

    #[async_trait]
    impl ObserverConnection for BrokenConnection {
        async fn send(&mut self, _message: Arc<str>) -> Result<(), DeliveryError> {
            Err(DeliveryError::Transport("broken pipe".to_string()))
        }
    }

    async fn wait_for_active(hub: &BroadcastHub, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.active_connections() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("hub never reached expected connection count");
    }

    #[test]
    fn closed_state_is_terminal() {
        let state = Mutex::new(ConnectionState::Connecting);
        set_state(&state, ConnectionState::Active);
        assert_eq!(*lock_state(&state), ConnectionState::Active);

        set_state(&state, ConnectionState::Closed);
        set_state(&state, ConnectionState::Active);
        assert_eq!(*lock_state(&state), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn register_sends_initial_state_first() {
        let hub = BroadcastHub::new();
        let (connection, mut rx) = ChannelConnection::pair();

        hub.register(connection, &snapshot(3, &["A1"])).unwrap();
        hub.broadcast(&snapshot(4, &["A1", "A2"]));

        let first = rx.next_message().await.unwrap();
        assert_eq!(first.kind, MessageType::InitialState);
        assert_eq!(seat_ids(&first), vec!["A1"]);

        let second = rx.next_message().await.unwrap();
        assert_eq!(second.kind, MessageType::ReservationUpdate);
        assert_eq!(seat_ids(&second), vec!["A1", "A2"]);
    }

    #[tokio::test]
    async fn connection_becomes_active_after_initial_delivery() {
        let hub = BroadcastHub::new();
        let (connection, mut rx) = ChannelConnection::pair();

        let id = hub.register(connection, &snapshot(0, &[])).unwrap();
        rx.next_message().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.connection_state(id) != ConnectionState::Active {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn late_joiner_catches_up_to_newer_broadcast() {
        let hub = BroadcastHub::new();
        hub.broadcast(&snapshot(5, &["A1", "A2"]));

        // Snapshot read before revision 5 was broadcast
        let (connection, mut rx) = ChannelConnection::pair();
        hub.register(connection, &snapshot(4, &["A1"])).unwrap();

        let first = rx.next_message().await.unwrap();
        assert_eq!(first.kind, MessageType::InitialState);
        let second = rx.next_message().await.unwrap();
        assert_eq!(second.kind, MessageType::ReservationUpdate);
        assert_eq!(seat_ids(&second), vec!["A1", "A2"]);
    }

    #[tokio::test]
    async fn joiner_with_newer_snapshot_skips_older_broadcast() {
        let hub = BroadcastHub::new();
        hub.broadcast(&snapshot(3, &["A1"]));

        let (connection, mut rx) = ChannelConnection::pair();
        hub.register(connection, &snapshot(5, &["A1", "A2", "A3"]))
            .unwrap();

        // Published for a mutation that committed before the join
        hub.broadcast(&snapshot(4, &["A1", "A2"]));
        hub.close_all();

        let initial = rx.next_message().await.unwrap();
        assert_eq!(initial.kind, MessageType::InitialState);
        assert_eq!(seat_ids(&initial), vec!["A1", "A2", "A3"]);
        assert!(rx.next_message().await.is_none());
    }

    #[tokio::test]
    async fn joiner_still_receives_later_broadcasts() {
        let hub = BroadcastHub::new();
        let (connection, mut rx) = ChannelConnection::pair();
        hub.register(connection, &snapshot(5, &["A1"])).unwrap();

        hub.broadcast(&snapshot(6, &["A1", "A2"]));
        hub.close_all();

        assert_eq!(
            rx.next_message().await.unwrap().kind,
            MessageType::InitialState
        );
        let update = rx.next_message().await.unwrap();
        assert_eq!(seat_ids(&update), vec!["A1", "A2"]);
        assert!(rx.next_message().await.is_none());
    }

    #[tokio::test]
    async fn stale_snapshots_are_dropped() {
        let hub = BroadcastHub::new();
        let (connection, mut rx) = ChannelConnection::pair();
        hub.register(connection, &snapshot(0, &[])).unwrap();

        hub.broadcast(&snapshot(2, &["A1", "A2"]));
        hub.broadcast(&snapshot(1, &["A1"]));
        hub.broadcast(&snapshot(3, &["A2"]));

        assert_eq!(hub.last_revision(), Some(Revision::new(3)));
        rx.next_message().await.unwrap();
        assert_eq!(seat_ids(&rx.next_message().await.unwrap()), vec!["A1", "A2"]);
        assert_eq!(seat_ids(&rx.next_message().await.unwrap()), vec!["A2"]);
    }

    #[tokio::test]
    async fn failing_connection_is_evicted_others_still_receive() {
        let hub = BroadcastHub::new();
        let (y, mut y_rx) = ChannelConnection::pair();
        let (z, mut z_rx) = ChannelConnection::pair();
        let x = hub.register(BrokenConnection, &snapshot(0, &[])).unwrap();
        hub.register(y, &snapshot(0, &[])).unwrap();
        hub.register(z, &snapshot(0, &[])).unwrap();

        hub.broadcast(&snapshot(1, &["A1"]));

        for rx in [&mut y_rx, &mut z_rx] {
            assert_eq!(
                rx.next_message().await.unwrap().kind,
                MessageType::InitialState
            );
            let update = rx.next_message().await.unwrap();
            assert_eq!(update.kind, MessageType::ReservationUpdate);
            assert_eq!(seat_ids(&update), vec!["A1"]);
        }

        wait_for_active(&hub, 2).await;
        assert_eq!(hub.connection_state(x), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn dropped_receiver_is_evicted() {
        let hub = BroadcastHub::new();
        let (connection, rx) = ChannelConnection::pair();
        hub.register(connection, &snapshot(0, &[])).unwrap();
        drop(rx);

        hub.broadcast(&snapshot(1, &["A1"]));

        wait_for_active(&hub, 0).await;
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_closes() {
        let hub = BroadcastHub::new();
        let (connection, mut rx) = ChannelConnection::pair();
        let id = hub.register(connection, &snapshot(0, &[])).unwrap();

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert_eq!(hub.active_connections(), 0);

        // Initial state still arrives, then the channel closes
        assert!(rx.next_message().await.is_some());
        assert!(rx.next_message().await.is_none());
        assert!(rx.was_closed());
    }

    #[tokio::test]
    async fn unregistered_connection_gets_no_further_updates() {
        let hub = BroadcastHub::new();
        let (a, mut a_rx) = ChannelConnection::pair();
        let (b, mut b_rx) = ChannelConnection::pair();
        let a_id = hub.register(a, &snapshot(0, &[])).unwrap();
        hub.register(b, &snapshot(0, &[])).unwrap();

        hub.unregister(a_id);
        hub.broadcast(&snapshot(1, &["A1"]));

        assert_eq!(
            a_rx.next_message().await.unwrap().kind,
            MessageType::InitialState
        );
        assert!(a_rx.next_message().await.is_none());

        b_rx.next_message().await.unwrap();
        assert_eq!(
            b_rx.next_message().await.unwrap().kind,
            MessageType::ReservationUpdate
        );
    }

    #[tokio::test]
    async fn close_all_empties_the_hub() {
        let hub = BroadcastHub::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (connection, rx) = ChannelConnection::pair();
            hub.register(connection, &snapshot(0, &[])).unwrap();
            receivers.push(rx);
        }
        assert_eq!(hub.active_connections(), 3);

        hub.close_all();
        assert_eq!(hub.active_connections(), 0);

        for rx in &mut receivers {
            assert!(rx.next_message().await.is_some());
            assert!(rx.next_message().await.is_none());
        }
    }
}
