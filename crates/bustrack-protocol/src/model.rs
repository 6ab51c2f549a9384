//! Shared data model.
//!
//! These records are what the server stores and what every snapshot carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds.
#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Lifecycle of a location request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for the driver.
    Pending,
    /// Driver agreed to share location.
    Accepted,
    /// Driver declined.
    Rejected,
}

impl RequestStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A driver's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Start sharing.
    Accepted,
    /// Decline.
    Rejected,
}

impl Decision {
    /// Parse the wire name of a decision.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(Decision::Accepted),
            "rejected" => Some(Decision::Rejected),
            _ => None,
        }
    }

    /// Wire name of the decision.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        RequestStatus::from(*self).as_str()
    }
}

impl From<Decision> for RequestStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => RequestStatus::Accepted,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A student's request for a bus location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusRequest {
    /// Bus the request targets.
    pub bus_id: String,
    /// Current status.
    pub status: RequestStatus,
    /// When the request was (re)submitted.
    pub requested_at: Timestamp,
}

impl BusRequest {
    /// Create a fresh pending request.
    #[must_use]
    pub fn pending(bus_id: impl Into<String>, requested_at: Timestamp) -> Self {
        Self {
            bus_id: bus_id.into(),
            status: RequestStatus::Pending,
            requested_at,
        }
    }
}

/// Last reported position of a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusLocation {
    /// Bus the position belongs to.
    pub bus_id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// When the position was received.
    pub updated_at: Timestamp,
}

/// The complete server state, the only unit of synchronization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Requests keyed by bus id.
    #[serde(default)]
    pub requests: BTreeMap<String, BusRequest>,
    /// Locations keyed by bus id.
    #[serde(default)]
    pub locations: BTreeMap<String, BusLocation>,
}

impl Snapshot {
    /// Check whether both mappings are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let request = BusRequest::pending("bus1", 42);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"busId": "bus1", "status": "pending", "requestedAt": 42})
        );
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!(Decision::parse("accepted"), Some(Decision::Accepted));
        assert_eq!(Decision::parse("rejected"), Some(Decision::Rejected));
        assert_eq!(Decision::parse("pending"), None);
        assert_eq!(RequestStatus::from(Decision::Rejected), RequestStatus::Rejected);
    }

    #[test]
    fn test_snapshot_missing_maps_default_to_empty() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.is_empty());
    }
}
