//! HTTP client for the request/response surface.
//!
//! Mirrors the persistent-connection operations for callers that cannot
//! hold a socket open. Every mutating call triggers the same server-side
//! broadcast as its WebSocket counterpart.

use bustrack_protocol::{BusLocation, BusRequest, Decision};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The base URL cannot carry a path.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    /// Network or decoding failure.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server refused the request (400) with the given message.
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// Any other non-success status.
    #[error("Unexpected status {0}")]
    Status(StatusCode),

    /// Body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    UnexpectedBody(#[from] serde_json::Error),
}

/// Success body of mutating routes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ack {
    /// Always `true` on success.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
}

/// Combined status view for one bus.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BusStatus {
    /// `pending`, `accepted`, `rejected` or `none`.
    pub status: String,
    /// Last known location.
    pub location: Option<BusLocation>,
}

/// Liveness probe body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    /// `ok` when the server is up.
    pub status: String,
    /// Human-readable message.
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    bus_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RespondBody<'a> {
    bus_id: &'a str,
    response: Decision,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationBody<'a> {
    bus_id: &'a str,
    lat: f64,
    lng: f64,
}

/// Client for the REST routes.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client for the server at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, HttpError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| HttpError::InvalidUrl(self.base_url.clone()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HttpError> {
        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let body: ErrorBody = response.json().await?;
            return Err(HttpError::Rejected(body.error));
        }
        if !status.is_success() {
            return Err(HttpError::Status(status));
        }
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, HttpError> {
        let url = self.endpoint(segments)?;
        debug!(url = %url, "GET");
        Self::read(self.client.get(url).send().await?).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, HttpError> {
        let url = self.endpoint(segments)?;
        debug!(url = %url, "POST");
        Self::read(self.client.post(url).json(body).send().await?).await
    }

    /// Create or restart a pending request for a bus.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Rejected`] for an empty bus id.
    pub async fn request(&self, bus_id: &str) -> Result<Ack, HttpError> {
        self.post(&["api", "request"], &RequestBody { bus_id }).await
    }

    /// Answer the request for a bus.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or validation rejection.
    pub async fn respond(&self, bus_id: &str, response: Decision) -> Result<Ack, HttpError> {
        self.post(&["api", "respond"], &RespondBody { bus_id, response })
            .await
    }

    /// Report a bus position.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or validation rejection.
    pub async fn location(&self, bus_id: &str, lat: f64, lng: f64) -> Result<Ack, HttpError> {
        self.post(&["api", "location"], &LocationBody { bus_id, lat, lng })
            .await
    }

    /// Request record for a bus, `None` when the server returns `{}`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn request_for(&self, bus_id: &str) -> Result<Option<BusRequest>, HttpError> {
        let value: serde_json::Value = self.get(&["api", "requests", bus_id]).await?;
        if value.as_object().is_some_and(|o| o.is_empty()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Combined status and location for a bus.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn status(&self, bus_id: &str) -> Result<BusStatus, HttpError> {
        self.get(&["api", "status", bus_id]).await
    }

    /// All requests.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn requests(&self) -> Result<BTreeMap<String, BusRequest>, HttpError> {
        self.get(&["api", "requests"]).await
    }

    /// All locations.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn locations(&self) -> Result<BTreeMap<String, BusLocation>, HttpError> {
        self.get(&["api", "locations"]).await
    }

    /// Clear all server state.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn reset(&self) -> Result<Ack, HttpError> {
        self.post(&["api", "reset"], &serde_json::json!({})).await
    }

    /// Liveness probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable.
    pub async fn health(&self) -> Result<Health, HttpError> {
        self.get(&["health"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let client = HttpClient::new("http://localhost:3000");
        let url = client.endpoint(&["api", "status", "bus 1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/status/bus%201");

        let client = HttpClient::new("http://example.com/tracker/");
        let url = client.endpoint(&["health"]).unwrap();
        assert_eq!(url.as_str(), "http://example.com/tracker/health");
    }

    #[test]
    fn test_invalid_base_url() {
        let client = HttpClient::new("not a url");
        assert!(matches!(
            client.endpoint(&["health"]),
            Err(HttpError::InvalidUrl(_))
        ));
    }
}
