//! In-memory state store.
//!
//! Two keyed maps, last write wins: bus id to request record and bus id
//! to last known location. The store has no behaviour beyond read and
//! replace; broadcasting is the handler's concern.

use bustrack_protocol::{
    now_millis, BusLocation, BusRequest, Decision, RequestStatus, Snapshot, Timestamp,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::error::CoreError;

/// Source of record timestamps.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now_millis()
    }
}

/// A store shared between the handler and the transports.
pub type SharedStore = Arc<Mutex<StateStore>>;

/// Wrap a store for sharing.
#[must_use]
pub fn shared(store: StateStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Request and location records keyed by bus id.
pub struct StateStore {
    state: Snapshot,
    clock: Box<dyn Clock>,
}

impl StateStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty store with a custom clock.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            state: Snapshot::default(),
            clock: Box::new(clock),
        }
    }

    /// Insert or overwrite a pending request for `bus_id`.
    ///
    /// A resubmission restarts the flow regardless of the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyBusId`] if `bus_id` is empty.
    pub fn apply_request(&mut self, bus_id: &str) -> Result<(), CoreError> {
        validate_bus_id(bus_id)?;
        let request = BusRequest::pending(bus_id, self.clock.now());
        if let Some(previous) = self.state.requests.insert(bus_id.to_string(), request) {
            debug!(bus_id = %bus_id, previous = %previous.status, "Request restarted");
        }
        Ok(())
    }

    /// Record a driver's decision.
    ///
    /// Returns `false` without touching anything when no request exists for `bus_id`.
    pub fn apply_response(&mut self, bus_id: &str, decision: Decision) -> bool {
        match self.state.requests.get_mut(bus_id) {
            Some(request) => {
                request.status = decision.into();
                true
            }
            None => {
                debug!(bus_id = %bus_id, "Response for unknown request dropped");
                false
            }
        }
    }

    /// Insert or overwrite the location of `bus_id`.
    ///
    /// No accepted request is required.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyBusId`] if `bus_id` is empty.
    pub fn apply_location(&mut self, bus_id: &str, lat: f64, lng: f64) -> Result<(), CoreError> {
        validate_bus_id(bus_id)?;
        let location = BusLocation {
            bus_id: bus_id.to_string(),
            lat,
            lng,
            updated_at: self.clock.now(),
        };
        self.state.locations.insert(bus_id.to_string(), location);
        Ok(())
    }

    /// Clear both mappings.
    pub fn reset(&mut self) {
        self.state.requests.clear();
        self.state.locations.clear();
    }

    /// Owned copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.clone()
    }

    /// Request record for a bus.
    #[must_use]
    pub fn request(&self, bus_id: &str) -> Option<&BusRequest> {
        self.state.requests.get(bus_id)
    }

    /// Location record for a bus.
    #[must_use]
    pub fn location(&self, bus_id: &str) -> Option<&BusLocation> {
        self.state.locations.get(bus_id)
    }

    /// Request status for a bus.
    #[must_use]
    pub fn status(&self, bus_id: &str) -> Option<RequestStatus> {
        self.request(bus_id).map(|r| r.status)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_bus_id(bus_id: &str) -> Result<(), CoreError> {
    if bus_id.is_empty() {
        return Err(CoreError::EmptyBusId);
    }
    Ok(())
}
