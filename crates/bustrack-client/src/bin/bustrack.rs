//! # bustrack
//!
//! Command-line student and driver clients.
//!
//! ## Usage
//!
//! ```bash
//! # Track a bus
//! bustrack student bus1
//!
//! # Drive it: accept the next request and stream a route
//! bustrack driver bus1 --waypoint 12.9716,77.5946 --waypoint 12.9750,77.6000
//!
//! # Talk to another server
//! BUSTRACK_WS_URL=ws://tracker.local:3000 bustrack student bus1
//! ```

use anyhow::Result;
use bustrack_client::{
    simulated_route, ClientEvent, ClientState, ConnectionState, HttpClient, LocationSharing,
    Outbound, Position, WsClient, DEFAULT_HTTP_URL, DEFAULT_WS_URL,
};
use bustrack_protocol::{Decision, Timestamp};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ROUTE: [Position; 4] = [
    Position::new(12.9716, 77.5946),
    Position::new(12.9731, 77.5968),
    Position::new(12.9750, 77.6000),
    Position::new(12.9733, 77.6021),
];

#[derive(Parser)]
#[command(name = "bustrack", version, about = "Bus location tracker client")]
struct Cli {
    /// WebSocket endpoint.
    #[arg(long, global = true, env = "BUSTRACK_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    /// HTTP base URL.
    #[arg(long, global = true, env = "BUSTRACK_HTTP_URL", default_value = DEFAULT_HTTP_URL)]
    http_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request a bus location and follow it.
    Student {
        /// Bus to track.
        bus_id: String,
    },
    /// Answer requests for a bus and share a simulated route.
    Driver {
        /// Bus you drive.
        bus_id: String,
        /// Reject requests instead of accepting them.
        #[arg(long)]
        reject: bool,
        /// Milliseconds between location updates.
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
        /// Route point as LAT,LNG; repeat for more points.
        #[arg(long = "waypoint")]
        waypoints: Vec<Position>,
    },
    /// Show request status and location over HTTP.
    Status {
        /// Bus to query.
        bus_id: String,
    },
    /// Clear all server state.
    Reset,
    /// Check that the server is up.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bustrack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Student { bus_id } => run_student(&cli.ws_url, &bus_id).await,
        Command::Driver {
            bus_id,
            reject,
            interval_ms,
            waypoints,
        } => {
            let route = if waypoints.is_empty() {
                DEFAULT_ROUTE.to_vec()
            } else {
                waypoints
            };
            let decision = if reject {
                Decision::Rejected
            } else {
                Decision::Accepted
            };
            run_driver(
                &cli.ws_url,
                &bus_id,
                decision,
                route,
                Duration::from_millis(interval_ms),
            )
            .await
        }
        Command::Status { bus_id } => {
            let status = HttpClient::new(cli.http_url).status(&bus_id).await?;
            match status.location {
                Some(location) => info!(
                    bus_id = %bus_id,
                    status = %status.status,
                    lat = location.lat,
                    lng = location.lng,
                    updated_at = location.updated_at,
                    "Bus status"
                ),
                None => info!(bus_id = %bus_id, status = %status.status, "Bus status"),
            }
            Ok(())
        }
        Command::Reset => {
            let ack = HttpClient::new(cli.http_url).reset().await?;
            info!("{}", ack.message);
            Ok(())
        }
        Command::Health => {
            let health = HttpClient::new(cli.http_url).health().await?;
            info!(status = %health.status, "{}", health.message);
            Ok(())
        }
    }
}

async fn run_student(ws_url: &str, bus_id: &str) -> Result<()> {
    let (client, mut events) = WsClient::connect(ws_url);
    let mut state = ClientState::new();
    let mut submitted: Option<String> = None;
    let mut last_view = String::new();
    let mut last_connection = state.connection();

    info!(url = %ws_url, bus_id = %bus_id, "Student connecting");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let connected = event == ClientEvent::Connected;
                state.handle(event);
                report_connection(&state, &mut last_connection);

                if connected && submitted.is_none() {
                    submitted = state.request_location(bus_id, &client);
                }
                report_error(&mut state);

                if let Some(bus_id) = &submitted {
                    let view = state.student_view(bus_id).to_string();
                    if view != last_view {
                        info!(bus_id = %bus_id, "{}", view);
                        last_view = view;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown();
    Ok(())
}

async fn run_driver(
    ws_url: &str,
    bus_id: &str,
    decision: Decision,
    route: Vec<Position>,
    interval: Duration,
) -> Result<()> {
    let (client, mut events) = WsClient::connect(ws_url);
    let client = Arc::new(client);
    let mut state = ClientState::new();
    let mut answered: Option<Timestamp> = None;
    let mut sharing: Option<LocationSharing> = None;
    let mut last_connection = state.connection();

    info!(url = %ws_url, bus_id = %bus_id, "Driver waiting for requests");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                state.handle(event);
                report_connection(&state, &mut last_connection);
                report_error(&mut state);

                let Some(request) = state.incoming_request(bus_id) else { continue };
                if answered == Some(request.requested_at) {
                    continue;
                }
                let requested_at = request.requested_at;

                info!(bus_id = %bus_id, decision = %decision, "Answering request");
                if !state.respond(bus_id, decision, client.as_ref()) {
                    report_error(&mut state);
                    continue;
                }
                answered = Some(requested_at);

                let idle = sharing.as_ref().map_or(true, |s| !s.is_running());
                if decision == Decision::Accepted && idle {
                    let source = simulated_route(route.clone(), interval);
                    let sink: Arc<dyn Outbound> = client.clone();
                    sharing = Some(LocationSharing::start(bus_id, source, sink));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(mut session) = sharing.take() {
        session.stop().await;
        if let Some(position) = session.last_position() {
            info!(bus_id = %bus_id, lat = position.lat, lng = position.lng, "Last shared position");
        }
        if let Some(e) = session.last_error() {
            warn!(bus_id = %bus_id, error = %e, "Last location error");
        }
    }
    client.shutdown();
    Ok(())
}

fn report_connection(state: &ClientState, last: &mut ConnectionState) {
    let current = state.connection();
    if current == *last {
        return;
    }
    *last = current;

    match state.connection_notice() {
        Some(notice) => warn!("{}", notice),
        None if current == ConnectionState::Connected => info!("Connected"),
        None => {}
    }
}

fn report_error(state: &mut ClientState) {
    if let Some(message) = state.error() {
        error!("{}", message);
        state.clear_error();
    }
}
