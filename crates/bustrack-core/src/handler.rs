//! Protocol handler.
//!
//! Validates inbound frames from either transport, applies them to the
//! store and triggers a broadcast. All failures are absorbed here and
//! surfaced as an [`Outcome`]; nothing is raised to the transport.
//!
//! Every mutation and its broadcast run while holding the store lock. One
//! event therefore completes, fan-out included, before the next is applied,
//! and snapshots leave in the order the mutations happened.

use bustrack_protocol::{codec, BusLocation, BusRequest, ClientFrame, Snapshot};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broadcaster::{Broadcaster, ConnectionId, Outgoing};
use crate::error::CoreError;
use crate::store::SharedStore;

/// Which front end a frame arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Persistent connection; only real mutations broadcast.
    Socket,
    /// Request/response surface; every validated frame broadcasts.
    Http,
}

/// Result of handling one frame.
#[derive(Debug)]
pub enum Outcome {
    /// The store changed and an update went to `recipients` connections.
    Applied {
        /// Connections the update was queued on.
        recipients: usize,
    },
    /// The frame was valid but changed nothing.
    Unchanged {
        /// Recipients of the broadcast, if one was still sent.
        recipients: Option<usize>,
    },
    /// The frame was refused before reaching the store.
    Ignored(CoreError),
}

impl Outcome {
    /// Check whether the store was mutated.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

/// Combined status view for one bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    /// Request status, `"none"` when there is no request.
    pub status: &'static str,
    /// Last known location.
    pub location: Option<BusLocation>,
}

/// Applies client frames to the store and fans out the result.
#[derive(Clone)]
pub struct ProtocolHandler {
    store: SharedStore,
    broadcaster: Arc<Broadcaster>,
}

impl ProtocolHandler {
    /// Create a handler over an injected store and broadcaster.
    #[must_use]
    pub fn new(store: SharedStore, broadcaster: Arc<Broadcaster>) -> Self {
        Self { store, broadcaster }
    }

    /// The broadcaster this handler fans out through.
    #[must_use]
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Register a new persistent connection and queue its `init` snapshot.
    ///
    /// The snapshot is taken under the store lock, so the connection sees
    /// `init` before any `update`.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outgoing>) {
        let store = self.store.lock();
        let (id, rx) = self.broadcaster.register();
        self.broadcaster.send_init(&id, &store.snapshot());
        (id, rx)
    }

    /// Drop a persistent connection from the fan-out set.
    pub fn disconnect(&self, id: &ConnectionId) {
        self.broadcaster.unregister(id);
    }

    /// Decode and apply a text frame received on a persistent connection.
    pub fn handle_text(&self, connection: &ConnectionId, text: &str) -> Outcome {
        match codec::decode_client(text) {
            Ok(frame) => {
                debug!(
                    connection = %connection,
                    kind = frame.kind().as_str(),
                    bus_id = %frame.bus_id(),
                    "Received frame"
                );
                self.dispatch(frame, Origin::Socket)
            }
            Err(e) => {
                warn!(connection = %connection, error = %e, "Ignoring malformed frame");
                Outcome::Ignored(e.into())
            }
        }
    }

    /// Apply a decoded frame.
    pub fn dispatch(&self, frame: ClientFrame, origin: Origin) -> Outcome {
        let mut store = self.store.lock();

        let changed = match &frame {
            ClientFrame::Request { bus_id } => store.apply_request(bus_id).map(|()| true),
            ClientFrame::Response { bus_id, response } => {
                if bus_id.is_empty() {
                    Err(CoreError::EmptyBusId)
                } else {
                    Ok(store.apply_response(bus_id, *response))
                }
            }
            ClientFrame::Location { bus_id, lat, lng } => {
                store.apply_location(bus_id, *lat, *lng).map(|()| true)
            }
        };

        match changed {
            Ok(true) => Outcome::Applied {
                recipients: self.broadcaster.broadcast(&store.snapshot()),
            },
            Ok(false) if origin == Origin::Http => Outcome::Unchanged {
                recipients: Some(self.broadcaster.broadcast(&store.snapshot())),
            },
            Ok(false) => Outcome::Unchanged { recipients: None },
            Err(e) => {
                warn!(kind = frame.kind().as_str(), ?origin, error = %e, "Rejected frame");
                Outcome::Ignored(e)
            }
        }
    }

    /// Clear all state and broadcast the empty snapshot.
    ///
    /// Connections stay registered.
    pub fn reset(&self) -> usize {
        let mut store = self.store.lock();
        store.reset();
        debug!("State reset");
        self.broadcaster.broadcast(&store.snapshot())
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.store.lock().snapshot()
    }

    /// Request record for a bus.
    #[must_use]
    pub fn request(&self, bus_id: &str) -> Option<BusRequest> {
        self.store.lock().request(bus_id).cloned()
    }

    /// Combined status and location for a bus.
    #[must_use]
    pub fn status(&self, bus_id: &str) -> StatusView {
        let store = self.store.lock();
        StatusView {
            status: store.status(bus_id).map_or("none", |s| s.as_str()),
            location: store.location(bus_id).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{shared, StateStore};
    use bustrack_protocol::{Decision, FrameKind, RequestStatus, ServerFrame};

    fn handler() -> ProtocolHandler {
        ProtocolHandler::new(shared(StateStore::new()), Arc::new(Broadcaster::new()))
    }

    fn next_frame(rx: &mut mpsc::UnboundedReceiver<Outgoing>) -> ServerFrame {
        codec::decode_server(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn test_connect_sends_init_first() {
        let handler = handler();
        handler.dispatch(ClientFrame::request("bus1"), Origin::Socket);

        let (_id, mut rx) = handler.connect();
        let frame = next_frame(&mut rx);
        assert_eq!(frame.kind(), FrameKind::Init);
        assert!(frame.snapshot().requests.contains_key("bus1"));
    }

    #[test]
    fn test_request_broadcasts_pending_update() {
        let handler = handler();
        let (id, mut rx) = handler.connect();
        let _init = next_frame(&mut rx);

        let outcome = handler.handle_text(&id, r#"{"type":"request","busId":"bus1"}"#);
        assert!(matches!(outcome, Outcome::Applied { recipients: 1 }));

        let frame = next_frame(&mut rx);
        assert_eq!(frame.kind(), FrameKind::Update);
        assert_eq!(
            frame.snapshot().requests["bus1"].status,
            RequestStatus::Pending
        );
        assert!(frame.snapshot().locations.is_empty());
    }

    #[test]
    fn test_accept_then_location() {
        let handler = handler();
        let (id, mut rx) = handler.connect();
        handler.handle_text(&id, r#"{"type":"request","busId":"bus1"}"#);
        handler.handle_text(&id, r#"{"type":"response","busId":"bus1","response":"accepted"}"#);
        handler.handle_text(&id, r#"{"type":"location","busId":"bus1","lat":1.0,"lng":2.0}"#);

        let mut last = None;
        while let Ok(text) = rx.try_recv() {
            last = Some(codec::decode_server(&text).unwrap());
        }
        let snapshot = last.unwrap().into_snapshot();
        assert_eq!(snapshot.requests["bus1"].status, RequestStatus::Accepted);
        let location = &snapshot.locations["bus1"];
        assert_eq!((location.lat, location.lng), (1.0, 2.0));
        assert_eq!(location.bus_id, "bus1");
    }

    #[test]
    fn test_socket_response_to_unknown_bus_is_silent() {
        let handler = handler();
        let (_id, mut rx) = handler.connect();
        let _init = next_frame(&mut rx);

        let outcome = handler.dispatch(
            ClientFrame::response("ghost", Decision::Accepted),
            Origin::Socket,
        );
        assert!(matches!(outcome, Outcome::Unchanged { recipients: None }));
        assert!(rx.try_recv().is_err());
        assert!(handler.request("ghost").is_none());
    }

    #[test]
    fn test_http_response_to_unknown_bus_still_broadcasts() {
        let handler = handler();
        let (_id, mut rx) = handler.connect();
        let _init = next_frame(&mut rx);

        let outcome = handler.dispatch(
            ClientFrame::response("ghost", Decision::Rejected),
            Origin::Http,
        );
        assert!(matches!(outcome, Outcome::Unchanged { recipients: Some(1) }));
        assert_eq!(next_frame(&mut rx).kind(), FrameKind::Update);
    }

    #[test]
    fn test_malformed_frames_ignored() {
        let handler = handler();
        let (id, mut rx) = handler.connect();
        let _init = next_frame(&mut rx);

        for text in [
            "{",
            r#"{"busId":"bus1"}"#,
            r#"{"type":"shout"}"#,
            r#"{"type":"location","busId":"bus1","lat":null,"lng":1}"#,
            r#"{"type":"request","busId":""}"#,
        ] {
            assert!(matches!(handler.handle_text(&id, text), Outcome::Ignored(_)));
        }
        assert!(rx.try_recv().is_err());
        assert!(handler.snapshot().is_empty());
    }

    #[test]
    fn test_reset_keeps_connections() {
        let handler = handler();
        let (_id, mut rx) = handler.connect();
        let _init = next_frame(&mut rx);
        handler.dispatch(ClientFrame::location("bus1", 1.0, 1.0), Origin::Http);
        let _update = next_frame(&mut rx);

        assert_eq!(handler.reset(), 1);
        assert!(next_frame(&mut rx).snapshot().is_empty());
        assert_eq!(handler.broadcaster().connection_count(), 1);
    }

    #[test]
    fn test_status_view_defaults_to_none() {
        let handler = handler();
        assert_eq!(
            handler.status("bus1"),
            StatusView {
                status: "none",
                location: None
            }
        );

        handler.dispatch(ClientFrame::request("bus1"), Origin::Http);
        assert_eq!(handler.status("bus1").status, "pending");
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let handler = handler();
        let (id, _rx) = handler.connect();
        handler.disconnect(&id);

        let outcome = handler.dispatch(ClientFrame::request("bus1"), Origin::Socket);
        assert!(matches!(outcome, Outcome::Applied { recipients: 0 }));
    }
}
