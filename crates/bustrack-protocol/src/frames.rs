//! Frame types for the tracker protocol.
//!
//! Frames are JSON objects with a `type` discriminator. Client frames carry
//! a single intent; server frames always carry the full [`Snapshot`].

use serde::{Deserialize, Serialize};

use crate::model::{Decision, Snapshot};

/// Frame kind identifiers, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Request,
    Response,
    Location,
    Init,
    Update,
}

impl FrameKind {
    /// Wire name of the frame kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Request => "request",
            FrameKind::Response => "response",
            FrameKind::Location => "location",
            FrameKind::Init => "init",
            FrameKind::Update => "update",
        }
    }
}

/// A frame sent by a student or driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Student asks for a bus location.
    #[serde(rename_all = "camelCase")]
    Request {
        /// Target bus.
        bus_id: String,
    },

    /// Driver answers the pending request for their bus.
    #[serde(rename_all = "camelCase")]
    Response {
        /// Driver's bus.
        bus_id: String,
        /// The decision.
        response: Decision,
    },

    /// Driver reports a position.
    #[serde(rename_all = "camelCase")]
    Location {
        /// Driver's bus.
        bus_id: String,
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
    },
}

impl ClientFrame {
    /// Get the frame kind.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            ClientFrame::Request { .. } => FrameKind::Request,
            ClientFrame::Response { .. } => FrameKind::Response,
            ClientFrame::Location { .. } => FrameKind::Location,
        }
    }

    /// Bus id the frame targets.
    #[must_use]
    pub fn bus_id(&self) -> &str {
        match self {
            ClientFrame::Request { bus_id }
            | ClientFrame::Response { bus_id, .. }
            | ClientFrame::Location { bus_id, .. } => bus_id,
        }
    }

    /// Create a new Request frame.
    #[must_use]
    pub fn request(bus_id: impl Into<String>) -> Self {
        ClientFrame::Request {
            bus_id: bus_id.into(),
        }
    }

    /// Create a new Response frame.
    #[must_use]
    pub fn response(bus_id: impl Into<String>, response: Decision) -> Self {
        ClientFrame::Response {
            bus_id: bus_id.into(),
            response,
        }
    }

    /// Create a new Location frame.
    #[must_use]
    pub fn location(bus_id: impl Into<String>, lat: f64, lng: f64) -> Self {
        ClientFrame::Location {
            bus_id: bus_id.into(),
            lat,
            lng,
        }
    }
}

/// A frame pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Sent once to every new connection.
    Init(Snapshot),
    /// Sent to every connection after a mutation.
    Update(Snapshot),
}

impl ServerFrame {
    /// Get the frame kind.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            ServerFrame::Init(_) => FrameKind::Init,
            ServerFrame::Update(_) => FrameKind::Update,
        }
    }

    /// The carried snapshot, whatever the kind.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        match self {
            ServerFrame::Init(snapshot) | ServerFrame::Update(snapshot) => snapshot,
        }
    }

    /// Consume the frame, keeping the snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> Snapshot {
        match self {
            ServerFrame::Init(snapshot) | ServerFrame::Update(snapshot) => snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BusRequest;
    use serde_json::json;

    #[test]
    fn test_client_frame_wire_shape() {
        let frame = ClientFrame::response("bus1", Decision::Accepted);
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "response", "busId": "bus1", "response": "accepted"})
        );
        assert_eq!(frame.kind(), FrameKind::Response);
        assert_eq!(frame.bus_id(), "bus1");
    }

    #[test]
    fn test_server_frame_wire_shape() {
        let mut snapshot = Snapshot::default();
        snapshot
            .requests
            .insert("bus1".into(), BusRequest::pending("bus1", 7));

        let value = serde_json::to_value(ServerFrame::Update(snapshot)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "update",
                "requests": {"bus1": {"busId": "bus1", "status": "pending", "requestedAt": 7}},
                "locations": {}
            })
        );
    }

    #[test]
    fn test_server_frame_snapshot_accessor() {
        let frame = ServerFrame::Init(Snapshot::default());
        assert_eq!(frame.kind(), FrameKind::Init);
        assert!(frame.snapshot().is_empty());
    }
}
