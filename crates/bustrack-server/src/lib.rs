//! # bustrack-server
//!
//! Axum front end over [`bustrack_core::ProtocolHandler`].
//!
//! - `GET /` upgrades to a WebSocket that receives `init` then `update`
//!   snapshots and may send `request`, `response` and `location` frames.
//! - `/api/*` mirrors the same operations over plain HTTP.
//! - `GET /health` reports liveness.

pub mod api;
pub mod config;
pub mod cors;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, serve, AppState};
