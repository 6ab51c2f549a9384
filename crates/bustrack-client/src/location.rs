//! Driver location sharing.
//!
//! A position source is any stream of fixes. [`LocationSharing`] forwards
//! each fix as a `location` frame from a background task until it is
//! stopped, the source ends, or the source reports an error. Dropping the
//! handle aborts the task, so leaving a driver view never leaks the
//! subscription.

use bustrack_protocol::ClientFrame;
use futures_util::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::traits::Outbound;

/// A geographic fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::str::FromStr for Position {
    type Err = String;

    /// Parse `LAT,LNG`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("expected LAT,LNG, got {s:?}"))?;
        let lat = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
        let lng = lng.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
        Ok(Self { lat, lng })
    }
}

/// Position source failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The user refused access to location.
    #[error("Location access denied")]
    PermissionDenied,
    /// No position could be determined.
    #[error("Location unavailable")]
    Unavailable,
    /// Acquiring a fix took too long.
    #[error("Location request timed out")]
    Timeout,
}

/// Observable state of a sharing session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharingState {
    /// At least one fix was taken from the source and the session is still running.
    ///
    /// A failed send does not clear it; see `last_error`.
    pub sharing: bool,
    /// Last fix received from the source.
    pub last_position: Option<Position>,
    /// Last source or send error.
    pub last_error: Option<String>,
}

/// Handle to a running sharing session.
pub struct LocationSharing {
    bus_id: String,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    state: watch::Receiver<SharingState>,
}

impl LocationSharing {
    /// Start forwarding fixes from `source` as `location` frames for `bus_id`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S>(bus_id: impl Into<String>, source: S, sink: Arc<dyn Outbound>) -> Self
    where
        S: Stream<Item = Result<Position, LocationError>> + Send + 'static,
    {
        let bus_id = bus_id.into();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SharingState::default());

        info!(bus_id = %bus_id, "Starting location sharing");
        let task = tokio::spawn(forward(bus_id.clone(), source, sink, stop_rx, state_tx));

        Self {
            bus_id,
            stop: Some(stop_tx),
            task: Some(task),
            state: state_rx,
        }
    }

    /// Bus the session reports for.
    #[must_use]
    pub fn bus_id(&self) -> &str {
        &self.bus_id
    }

    /// Check whether fixes are being forwarded.
    #[must_use]
    pub fn is_sharing(&self) -> bool {
        self.state.borrow().sharing
    }

    /// Check whether the background task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Last fix taken from the source.
    #[must_use]
    pub fn last_position(&self) -> Option<Position> {
        self.state.borrow().last_position
    }

    /// Last source or send error.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SharingState {
        self.state.borrow().clone()
    }

    /// Watch the session state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SharingState> {
        self.state.clone()
    }

    /// Stop sharing and wait for the task to finish.
    ///
    /// No frame is sent after this returns. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(bus_id = %self.bus_id, error = %e, "Location task failed");
                }
            }
            info!(bus_id = %self.bus_id, "Stopped location sharing");
        }
    }
}

impl Drop for LocationSharing {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(bus_id = %self.bus_id, "Location sharing aborted on drop");
        }
    }
}

async fn forward<S>(
    bus_id: String,
    source: S,
    sink: Arc<dyn Outbound>,
    mut stop: oneshot::Receiver<()>,
    state: watch::Sender<SharingState>,
) where
    S: Stream<Item = Result<Position, LocationError>> + Send,
{
    let mut source = std::pin::pin!(source);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => break,

            next = source.next() => match next {
                Some(Ok(position)) => {
                    let frame = ClientFrame::location(&bus_id, position.lat, position.lng);
                    let sent = sink.send(frame);
                    state.send_modify(|s| {
                        s.sharing = true;
                        s.last_position = Some(position);
                        if let Err(e) = &sent {
                            s.last_error = Some(e.to_string());
                        }
                    });
                    match sent {
                        Ok(()) => {
                            let (lat, lng) = (position.lat, position.lng);
                            debug!(bus_id = %bus_id, lat, lng, "Location sent");
                        }
                        Err(e) => warn!(bus_id = %bus_id, error = %e, "Failed to send location"),
                    }
                }
                Some(Err(e)) => {
                    warn!(bus_id = %bus_id, error = %e, "Position source failed");
                    state.send_modify(|s| s.last_error = Some(e.to_string()));
                    break;
                }
                None => {
                    debug!(bus_id = %bus_id, "Position source ended");
                    break;
                }
            },
        }
    }

    state.send_modify(|s| s.sharing = false);
}

/// A stand-in position source that cycles through `waypoints`, one fix per `interval`.
///
/// The first fix is immediate. An empty route yields a single
/// [`LocationError::Unavailable`].
pub fn simulated_route(
    waypoints: Vec<Position>,
    interval: Duration,
) -> impl Stream<Item = Result<Position, LocationError>> + Send + 'static {
    if waypoints.is_empty() {
        return stream::once(async { Err(LocationError::Unavailable) }).left_stream();
    }

    let interval = interval.max(Duration::from_millis(1));
    stream::unfold(
        (waypoints, 0usize, None::<tokio::time::Interval>),
        move |(waypoints, index, ticker)| async move {
            let mut ticker = ticker.unwrap_or_else(|| tokio::time::interval(interval));
            ticker.tick().await;
            let position = waypoints[index % waypoints.len()];
            Some((Ok(position), (waypoints, index + 1, Some(ticker))))
        },
    )
    .right_stream()
}
