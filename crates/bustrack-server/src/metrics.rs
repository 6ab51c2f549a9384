//! Metrics collection and export.
//!
//! Instrumented with the `metrics` facade and exported in Prometheus
//! format. Without an installed recorder every call is a no-op.

use bustrack_core::Outcome;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "bustrack_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "bustrack_connections_active";
    pub const CONNECTIONS_REFUSED: &str = "bustrack_connections_refused_total";
    pub const MESSAGES_TOTAL: &str = "bustrack_messages_total";
    pub const MESSAGES_BYTES: &str = "bustrack_messages_bytes";
    pub const FRAMES_TOTAL: &str = "bustrack_frames_total";
    pub const BROADCAST_RECIPIENTS: &str = "bustrack_broadcast_recipients";
    pub const LATENCY_SECONDS: &str = "bustrack_latency_seconds";
    pub const ERRORS_TOTAL: &str = "bustrack_errors_total";
}

/// Describe all metrics.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of WebSocket connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of WebSocket connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REFUSED,
        "Upgrades refused because the connection limit was reached"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "WebSocket messages sent and received");
    metrics::describe_counter!(names::MESSAGES_BYTES, "WebSocket message bytes sent and received");
    metrics::describe_counter!(
        names::FRAMES_TOTAL,
        "Client frames handled, by origin and outcome"
    );
    metrics::describe_histogram!(
        names::BROADCAST_RECIPIENTS,
        "Connections reached by each snapshot broadcast"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound frame processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an upgrade refused at the connection limit.
pub fn record_refused_connection() {
    counter!(names::CONNECTIONS_REFUSED).increment(1);
}

/// Record a WebSocket message.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record how a client frame was handled.
pub fn record_outcome(outcome: &Outcome, origin: &'static str) {
    let (label, recipients) = match outcome {
        Outcome::Applied { recipients } => ("applied", Some(*recipients)),
        Outcome::Unchanged { recipients } => ("unchanged", *recipients),
        Outcome::Ignored(_) => ("ignored", None),
    };

    counter!(names::FRAMES_TOTAL, "origin" => origin, "outcome" => label).increment(1);
    if let Some(recipients) = recipients {
        histogram!(names::BROADCAST_RECIPIENTS).record(recipients as f64);
    }
}

/// Record a broadcast not tied to a client frame.
pub fn record_broadcast(recipients: usize) {
    histogram!(names::BROADCAST_RECIPIENTS).record(recipients as f64);
}

/// Record frame processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Records a disconnection when dropped.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_core::CoreError;

    #[test]
    fn test_recording_without_recorder() {
        let _guard = ConnectionMetricsGuard::new();
        record_outcome(&Outcome::Applied { recipients: 3 }, "socket");
        record_outcome(&Outcome::Unchanged { recipients: None }, "socket");
        record_outcome(&Outcome::Ignored(CoreError::EmptyBusId), "http");
        record_broadcast(0);
    }
}
