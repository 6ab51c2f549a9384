//! HTTP mirror of the WebSocket protocol.
//!
//! Mutating routes go through the same [`ProtocolHandler`] as socket
//! frames, tagged [`Origin::Http`], so every validated call broadcasts.
//!
//! [`ProtocolHandler`]: bustrack_core::ProtocolHandler

use crate::handlers::AppState;
use crate::metrics;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bustrack_core::{CoreError, Origin, Outcome, StatusView};
use bustrack_protocol::{BusLocation, BusRequest, ClientFrame, Decision};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Request validation failures, answered with 400 `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("busId required")]
    MissingBusId,

    #[error("busId and response required")]
    MissingResponse,

    #[error("response must be accepted or rejected")]
    InvalidResponse,

    #[error("busId, lat, lng required")]
    MissingLocation,

    #[error("lat and lng must be numbers")]
    NonNumericLocation,

    /// Body was not valid JSON.
    #[error("{0}")]
    Body(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        metrics::record_error("bad_request");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Success body for mutating routes.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Routes under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/request", post(create_request))
        .route("/api/requests", get(list_requests))
        .route("/api/requests/:bus_id", get(get_request))
        .route("/api/status/:bus_id", get(get_status))
        .route("/api/respond", post(respond))
        .route("/api/location", post(update_location))
        .route("/api/locations", get(list_locations))
        .route("/api/reset", post(reset))
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(body) = body?;
    apply(&state, parse_request(&body)?)?;
    Ok(Ack::ok("Request created"))
}

async fn respond(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(body) = body?;
    let (bus_id, decision) = parse_response(&body)?;
    apply(&state, ClientFrame::response(bus_id, decision))?;
    Ok(Ack::ok(format!("Request {decision}")))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(body) = body?;
    apply(&state, parse_location(&body)?)?;
    Ok(Ack::ok("Location updated"))
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<Ack> {
    let recipients = state.handler.reset();
    metrics::record_broadcast(recipients);
    debug!(recipients, "State reset over HTTP");
    Ack::ok("State reset")
}

async fn get_request(State(state): State<Arc<AppState>>, Path(bus_id): Path<String>) -> Response {
    match state.handler.request(&bus_id) {
        Some(request) => Json(request).into_response(),
        None => Json(json!({})).into_response(),
    }
}

async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(bus_id): Path<String>,
) -> Json<StatusView> {
    Json(state.handler.status(&bus_id))
}

async fn list_requests(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, BusRequest>> {
    Json(state.handler.snapshot().requests)
}

async fn list_locations(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, BusLocation>> {
    Json(state.handler.snapshot().locations)
}

fn apply(state: &AppState, frame: ClientFrame) -> Result<(), ApiError> {
    let kind = frame.kind().as_str();
    let outcome = state.handler.dispatch(frame, Origin::Http);
    metrics::record_outcome(&outcome, "http");

    match outcome {
        Outcome::Ignored(e) => Err(e.into()),
        Outcome::Applied { recipients } | Outcome::Unchanged { recipients: Some(recipients) } => {
            debug!(kind, recipients, "Handled HTTP frame");
            Ok(())
        }
        Outcome::Unchanged { recipients: None } => Ok(()),
    }
}

/// Non-empty string `busId`.
fn bus_id(body: &Value) -> Option<&str> {
    body.get("busId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Field that is present and not `null`.
fn field<'a>(body: &'a Value, key: &str) -> Option<&'a Value> {
    body.get(key).filter(|value| !value.is_null())
}

fn parse_request(body: &Value) -> Result<ClientFrame, ApiError> {
    let bus_id = bus_id(body).ok_or(ApiError::MissingBusId)?;
    Ok(ClientFrame::request(bus_id))
}

fn parse_response(body: &Value) -> Result<(&str, Decision), ApiError> {
    let (Some(bus_id), Some(response)) = (bus_id(body), field(body, "response")) else {
        return Err(ApiError::MissingResponse);
    };
    if response.as_str() == Some("") {
        return Err(ApiError::MissingResponse);
    }

    let decision = response
        .as_str()
        .and_then(Decision::parse)
        .ok_or(ApiError::InvalidResponse)?;
    Ok((bus_id, decision))
}

fn parse_location(body: &Value) -> Result<ClientFrame, ApiError> {
    let (Some(bus_id), Some(lat), Some(lng)) =
        (bus_id(body), field(body, "lat"), field(body, "lng"))
    else {
        return Err(ApiError::MissingLocation);
    };

    let (Some(lat), Some(lng)) = (lat.as_f64(), lng.as_f64()) else {
        return Err(ApiError::NonNumericLocation);
    };
    Ok(ClientFrame::location(bus_id, lat, lng))
}
