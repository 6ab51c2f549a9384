//! Connection handlers.
//!
//! Builds the router and drives each WebSocket connection: queued
//! snapshots go out, inbound frames go to the protocol handler.

use crate::api;
use crate::config::Config;
use crate::cors::cors_layer;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bustrack_core::{shared, Broadcaster, ConnectionId, ProtocolHandler, StateStore};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Applies frames and fans out snapshots.
    pub handler: ProtocolHandler,
    /// Server configuration.
    pub config: Config,
    /// One permit per allowed WebSocket connection.
    connection_slots: Arc<Semaphore>,
}

impl AppState {
    /// Create app state with an empty store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let slots = config.limits.max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            handler: ProtocolHandler::new(shared(StateStore::new()), Arc::new(Broadcaster::new())),
            connection_slots: Arc::new(Semaphore::new(slots)),
            config,
        }
    }

    /// Reserve a connection slot, held until the permit is dropped.
    ///
    /// Returns `None` when `limits.max_connections` slots are taken.
    pub fn reserve_connection(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.connection_slots).try_acquire_owned().ok()
    }
}

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .merge(api::routes())
        .layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the application on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O failure.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the address is invalid or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("bustrack server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config))).await
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(slot) = state.reserve_connection() else {
        warn!(limit = state.config.limits.max_connections, "Refusing WebSocket upgrade");
        metrics::record_refused_connection();
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

/// Handle a WebSocket connection.
///
/// `_slot` is released when the connection ends.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, _slot: OwnedSemaphorePermit) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (connection_id, mut outgoing) = state.handler.connect();
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            queued = outgoing.recv() => {
                let Some(text) = queued else { break };
                metrics::record_message(text.len(), "outbound");
                if sender.send(Message::Text(text.to_string())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, &connection_id, &text);
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_inbound(&state, &connection_id, text),
                        Err(e) => {
                            warn!(
                                connection = %connection_id,
                                error = %e,
                                "Ignoring non UTF-8 frame"
                            );
                            metrics::record_error("invalid_utf8");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.handler.disconnect(&connection_id);
    debug!(connection = %connection_id, "WebSocket disconnected");
}

fn handle_inbound(state: &AppState, connection_id: &ConnectionId, text: &str) {
    let start = Instant::now();
    metrics::record_message(text.len(), "inbound");

    let outcome = state.handler.handle_text(connection_id, text);
    metrics::record_outcome(&outcome, "socket");

    metrics::record_latency(start.elapsed().as_secs_f64());
}
