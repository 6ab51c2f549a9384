//! Snapshot fan-out to open connections.
//!
//! Each registered connection owns an unbounded outbound queue. A broadcast
//! encodes the snapshot once and pushes the shared text onto every queue;
//! the transport task behind each queue writes it to its socket.

use bustrack_protocol::{codec, ServerFrame, Snapshot};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Encoded frame shared by every recipient of one broadcast.
pub type Outgoing = Arc<str>;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{n}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The live connection set.
#[derive(Default)]
pub struct Broadcaster {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Outgoing>>,
}

impl Broadcaster {
    /// Create an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    ///
    /// Returns its ID and the queue the transport should drain.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outgoing>) {
        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id.clone(), tx);
        debug!(connection = %id, connections = self.connections.len(), "Connection registered");
        (id, rx)
    }

    /// Remove a connection.
    ///
    /// Returns `true` if the connection was registered.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            let connections = self.connections.len();
            debug!(connection = %id, connections, "Connection unregistered");
        }
        removed
    }

    /// Queue the one-time `init` snapshot for a single connection.
    ///
    /// Returns `false` if the connection is unknown or already closed.
    pub fn send_init(&self, id: &ConnectionId, snapshot: &Snapshot) -> bool {
        let Some(text) = encode(&ServerFrame::Init(snapshot.clone())) else {
            return false;
        };
        self.connections
            .get(id)
            .map(|tx| tx.send(text).is_ok())
            .unwrap_or(false)
    }

    /// Push an `update` snapshot to every open connection.
    ///
    /// Connections that have gone away are skipped and pruned. Returns the
    /// number of connections the update was queued on.
    pub fn broadcast(&self, snapshot: &Snapshot) -> usize {
        let Some(text) = encode(&ServerFrame::Update(snapshot.clone())) else {
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().send(Arc::clone(&text)).is_ok() {
                delivered += 1;
            } else {
                closed.push(entry.key().clone());
            }
        }

        for id in &closed {
            self.connections.remove(id);
            trace!(connection = %id, "Skipped closed connection");
        }

        trace!(recipients = delivered, skipped = closed.len(), "Broadcast snapshot");
        delivered
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

fn encode(frame: &ServerFrame) -> Option<Outgoing> {
    match codec::encode_server(frame) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            error!(error = %e, "Failed to encode snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_protocol::{BusRequest, FrameKind};

    fn snapshot_with(bus_id: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .requests
            .insert(bus_id.to_string(), BusRequest::pending(bus_id, 1));
        snapshot
    }

    #[test]
    fn test_connection_ids_unique() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_broadcast_reaches_all() {
        let broadcaster = Broadcaster::new();
        let (_id1, mut rx1) = broadcaster.register();
        let (_id2, mut rx2) = broadcaster.register();

        assert_eq!(broadcaster.broadcast(&snapshot_with("bus1")), 2);

        for rx in [&mut rx1, &mut rx2] {
            let text = rx.try_recv().unwrap();
            let frame = codec::decode_server(&text).unwrap();
            assert_eq!(frame.kind(), FrameKind::Update);
            assert!(frame.snapshot().requests.contains_key("bus1"));
        }
    }

    #[test]
    fn test_closed_connection_skipped() {
        let broadcaster = Broadcaster::new();
        let (_open, mut rx) = broadcaster.register();
        let (_closed, dropped) = broadcaster.register();
        drop(dropped);

        assert_eq!(broadcaster.broadcast(&Snapshot::default()), 1);
        assert_eq!(broadcaster.connection_count(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_init_targets_one_connection() {
        let broadcaster = Broadcaster::new();
        let (id1, mut rx1) = broadcaster.register();
        let (_id2, mut rx2) = broadcaster.register();

        assert!(broadcaster.send_init(&id1, &snapshot_with("bus3")));

        let frame = codec::decode_server(&rx1.try_recv().unwrap()).unwrap();
        assert_eq!(frame.kind(), FrameKind::Init);
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_unregister() {
        let broadcaster = Broadcaster::new();
        let (id, _rx) = broadcaster.register();

        assert!(broadcaster.unregister(&id));
        assert!(!broadcaster.unregister(&id));
        assert_eq!(broadcaster.broadcast(&Snapshot::default()), 0);
        assert!(!broadcaster.send_init(&id, &Snapshot::default()));
    }
}
