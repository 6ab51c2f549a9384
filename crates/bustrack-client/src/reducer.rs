//! Client view state.
//!
//! [`ClientState`] is the "view model" for a student or driver. It holds the
//! last snapshot the server confirmed and nothing else: snapshots replace
//! the maps wholesale, and user actions only emit frames.

use bustrack_protocol::{BusLocation, BusRequest, ClientFrame, Decision, RequestStatus, ServerFrame};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::traits::{ClientEvent, Outbound};

/// Shown when an action is attempted without a connection.
pub const NOT_CONNECTED: &str = "Not connected to server";

/// Shown when the connection drops abnormally.
pub const CONNECTION_FAILED: &str =
    "Connection to server failed. Make sure the server is running.";

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt in progress.
    Connecting,
    /// Connected; snapshots are flowing.
    Connected,
    /// Not connected to server.
    Disconnected,
}

/// What a student tracking one bus should see.
#[derive(Debug, Clone, PartialEq)]
pub enum StudentView<'a> {
    /// No request known for the bus.
    Idle,
    /// Request sent, driver has not answered.
    Waiting,
    /// Driver declined.
    Denied,
    /// Driver accepted, no position yet.
    AwaitingFirstFix,
    /// Driver accepted and a position is known.
    Tracking(&'a BusLocation),
}

impl fmt::Display for StudentView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentView::Idle => f.write_str("no request"),
            StudentView::Waiting => f.write_str("waiting for driver response"),
            StudentView::Denied => f.write_str("request denied"),
            StudentView::AwaitingFirstFix => f.write_str("accepted, waiting for first location"),
            StudentView::Tracking(location) => {
                write!(f, "tracking at {:.4}, {:.4}", location.lat, location.lng)
            }
        }
    }
}

/// Local mirror of the server state plus connection status.
#[derive(Debug, Clone)]
pub struct ClientState {
    requests: BTreeMap<String, BusRequest>,
    locations: BTreeMap<String, BusLocation>,
    connection: ConnectionState,
    error: Option<String>,
}

impl ClientState {
    /// Create an empty state, waiting for the first connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: BTreeMap::new(),
            locations: BTreeMap::new(),
            connection: ConnectionState::Connecting,
            error: None,
        }
    }

    /// Apply a connection event.
    pub fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => self.on_connected(),
            ClientEvent::Frame(frame) => self.apply(frame),
            ClientEvent::Disconnected { error } => self.on_disconnected(error.as_deref()),
        }
    }

    /// Replace the local view with a snapshot. `init` and `update` are treated alike.
    pub fn apply(&mut self, frame: ServerFrame) {
        let kind = frame.kind();
        let snapshot = frame.into_snapshot();
        debug!(
            kind = kind.as_str(),
            requests = snapshot.requests.len(),
            locations = snapshot.locations.len(),
            "Applying snapshot"
        );
        self.requests = snapshot.requests;
        self.locations = snapshot.locations;
    }

    /// Mark the connection as up.
    pub fn on_connected(&mut self) {
        self.connection = ConnectionState::Connected;
        self.error = None;
    }

    /// Mark the connection as down. The view is kept until a fresh `init` replaces it.
    pub fn on_disconnected(&mut self, error: Option<&str>) {
        self.connection = ConnectionState::Disconnected;
        if let Some(reason) = error {
            warn!(reason = %reason, "Connection lost");
            self.error = Some(CONNECTION_FAILED.to_string());
        }
    }

    /// Student action: ask for a bus location.
    ///
    /// The id is trimmed; blank input emits nothing. Returns the submitted id
    /// when a frame was sent.
    pub fn request_location(&mut self, bus_id: &str, link: &dyn Outbound) -> Option<String> {
        let bus_id = bus_id.trim();
        if bus_id.is_empty() {
            return None;
        }
        self.emit(ClientFrame::request(bus_id), link)
            .then(|| bus_id.to_string())
    }

    /// Driver action: answer the request for `bus_id`.
    pub fn respond(&mut self, bus_id: &str, decision: Decision, link: &dyn Outbound) -> bool {
        self.emit(ClientFrame::response(bus_id, decision), link)
    }

    /// Driver action: report a position.
    pub fn share_location(
        &mut self,
        bus_id: &str,
        lat: f64,
        lng: f64,
        link: &dyn Outbound,
    ) -> bool {
        self.emit(ClientFrame::location(bus_id, lat, lng), link)
    }

    fn emit(&mut self, frame: ClientFrame, link: &dyn Outbound) -> bool {
        if self.connection != ConnectionState::Connected || !link.is_open() {
            self.error = Some(NOT_CONNECTED.to_string());
            return false;
        }
        let kind = frame.kind();
        match link.send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "Failed to send frame");
                self.error = Some(NOT_CONNECTED.to_string());
                false
            }
        }
    }

    /// What a student tracking `bus_id` should see.
    #[must_use]
    pub fn student_view(&self, bus_id: &str) -> StudentView<'_> {
        let Some(request) = self.requests.get(bus_id) else {
            return StudentView::Idle;
        };
        match request.status {
            RequestStatus::Pending => StudentView::Waiting,
            RequestStatus::Rejected => StudentView::Denied,
            RequestStatus::Accepted => match self.locations.get(bus_id) {
                Some(location) => StudentView::Tracking(location),
                None => StudentView::AwaitingFirstFix,
            },
        }
    }

    /// The pending request a driver of `bus_id` should answer, if any.
    #[must_use]
    pub fn incoming_request(&self, bus_id: &str) -> Option<&BusRequest> {
        self.requests
            .get(bus_id)
            .filter(|r| r.status == RequestStatus::Pending)
    }

    /// Requests keyed by bus id.
    #[must_use]
    pub fn requests(&self) -> &BTreeMap<String, BusRequest> {
        &self.requests
    }

    /// Locations keyed by bus id.
    #[must_use]
    pub fn locations(&self) -> &BTreeMap<String, BusLocation> {
        &self.locations
    }

    /// Current connection state.
    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Check whether the connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Banner to show while the connection is down, whether or not it closed cleanly.
    #[must_use]
    pub fn connection_notice(&self) -> Option<&'static str> {
        (self.connection == ConnectionState::Disconnected).then_some(NOT_CONNECTED)
    }

    /// User-visible error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Dismiss the error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Clear the local view, e.g. when the user leaves the page.
    pub fn reset_view(&mut self) {
        self.requests.clear();
        self.locations.clear();
        self.error = None;
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingLink;
    use bustrack_protocol::Snapshot;

    fn connected() -> ClientState {
        let mut state = ClientState::new();
        state.handle(ClientEvent::Connected);
        state
    }

    fn snapshot(status: Option<RequestStatus>, location: Option<(f64, f64)>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        if let Some(status) = status {
            snapshot.requests.insert(
                "bus1".into(),
                BusRequest {
                    bus_id: "bus1".into(),
                    status,
                    requested_at: 1,
                },
            );
        }
        if let Some((lat, lng)) = location {
            snapshot.locations.insert(
                "bus1".into(),
                BusLocation {
                    bus_id: "bus1".into(),
                    lat,
                    lng,
                    updated_at: 2,
                },
            );
        }
        snapshot
    }

    #[test]
    fn test_snapshot_replaces_view() {
        let mut state = connected();
        state.apply(ServerFrame::Init(snapshot(
            Some(RequestStatus::Pending),
            Some((1.0, 2.0)),
        )));
        assert_eq!(state.requests().len(), 1);

        state.apply(ServerFrame::Update(Snapshot::default()));
        assert!(state.requests().is_empty());
        assert!(state.locations().is_empty());
    }

    #[test]
    fn test_actions_do_not_touch_view() {
        let link = RecordingLink::open();
        let mut state = connected();

        assert_eq!(
            state.request_location("  bus1 ", &link),
            Some("bus1".to_string())
        );
        assert!(state.requests().is_empty());
        assert_eq!(link.sent(), vec![ClientFrame::request("bus1")]);
    }

    #[test]
    fn test_blank_request_ignored() {
        let link = RecordingLink::open();
        let mut state = connected();

        assert_eq!(state.request_location("   ", &link), None);
        assert!(link.sent().is_empty());
        assert!(state.error().is_none());
    }

    #[test]
    fn test_actions_while_disconnected_report_error() {
        let link = RecordingLink::closed();
        let mut state = connected();

        assert!(!state.respond("bus1", Decision::Accepted, &link));
        assert_eq!(state.error(), Some(NOT_CONNECTED));
        assert!(link.sent().is_empty());

        let mut state = ClientState::new();
        let open = RecordingLink::open();
        assert!(!state.share_location("bus1", 1.0, 2.0, &open));
        assert!(open.sent().is_empty());
    }

    #[test]
    fn test_disconnect_surfaces_and_reconnect_clears() {
        let mut state = connected();
        state.handle(ClientEvent::Disconnected {
            error: Some("connection refused".into()),
        });
        assert_eq!(state.connection(), ConnectionState::Disconnected);
        assert_eq!(state.error(), Some(CONNECTION_FAILED));

        state.handle(ClientEvent::Connected);
        assert!(state.is_connected());
        assert!(state.error().is_none());
    }

    #[test]
    fn test_clean_close_has_no_error() {
        let mut state = connected();
        state.handle(ClientEvent::Disconnected { error: None });
        assert!(!state.is_connected());
        assert!(state.error().is_none());
        assert_eq!(state.connection_notice(), Some(NOT_CONNECTED));

        state.handle(ClientEvent::Connected);
        assert!(state.connection_notice().is_none());
    }

    #[test]
    fn test_no_notice_before_first_connect() {
        let state = ClientState::new();
        assert_eq!(state.connection(), ConnectionState::Connecting);
        assert!(state.connection_notice().is_none());
    }

    #[test]
    fn test_student_view_transitions() {
        let mut state = connected();
        assert_eq!(state.student_view("bus1"), StudentView::Idle);

        state.apply(ServerFrame::Update(snapshot(Some(RequestStatus::Pending), None)));
        assert_eq!(state.student_view("bus1"), StudentView::Waiting);

        state.apply(ServerFrame::Update(snapshot(Some(RequestStatus::Accepted), None)));
        assert_eq!(state.student_view("bus1"), StudentView::AwaitingFirstFix);

        state.apply(ServerFrame::Update(snapshot(
            Some(RequestStatus::Accepted),
            Some((1.0, 2.0)),
        )));
        match state.student_view("bus1") {
            StudentView::Tracking(location) => assert_eq!(location.lng, 2.0),
            other => panic!("Expected Tracking, got {:?}", other),
        }

        state.apply(ServerFrame::Update(snapshot(
            Some(RequestStatus::Rejected),
            Some((1.0, 2.0)),
        )));
        assert_eq!(state.student_view("bus1"), StudentView::Denied);
    }

    #[test]
    fn test_incoming_request_only_when_pending() {
        let mut state = connected();
        state.apply(ServerFrame::Update(snapshot(Some(RequestStatus::Pending), None)));
        assert!(state.incoming_request("bus1").is_some());
        assert!(state.incoming_request("bus2").is_none());

        state.apply(ServerFrame::Update(snapshot(Some(RequestStatus::Accepted), None)));
        assert!(state.incoming_request("bus1").is_none());
    }

    #[test]
    fn test_reset_view() {
        let mut state = connected();
        state.apply(ServerFrame::Init(snapshot(Some(RequestStatus::Pending), None)));
        state.reset_view();
        assert!(state.requests().is_empty());
        assert!(state.is_connected());
    }
}
