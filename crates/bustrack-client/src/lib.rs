//! # bustrack-client
//!
//! Client side of the bus location tracker.
//!
//! - **ClientState** - reducer that mirrors the last snapshot the server pushed
//! - **WsClient** - persistent connection with reconnect
//! - **HttpClient** - the stateless request/response surface
//! - **LocationSharing** - cancellable stream of driver positions
//!
//! The local view is never updated optimistically. Actions emit protocol
//! frames; the view changes only when the next snapshot arrives.
//!
//! ```rust,ignore
//! use bustrack_client::{ClientState, WsClient};
//!
//! let (client, mut events) = WsClient::connect("ws://localhost:3000");
//! let mut state = ClientState::new();
//! while let Some(event) = events.recv().await {
//!     state.handle(event);
//! }
//! ```

pub mod http;
pub mod location;
pub mod reducer;
pub mod traits;
pub mod websocket;

#[cfg(test)]
pub(crate) mod test_support;

pub use http::{HttpClient, HttpError};
pub use location::{simulated_route, LocationError, LocationSharing, Position, SharingState};
pub use reducer::{ClientState, ConnectionState, StudentView};
pub use traits::{ClientEvent, Outbound, TransportError};
pub use websocket::WsClient;

/// Default persistent-connection endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:3000";

/// Default HTTP base URL.
pub const DEFAULT_HTTP_URL: &str = "http://localhost:3000";
