//! # bustrack-core
//!
//! Server-side state synchronization for the bus location tracker.
//!
//! - **StateStore** - request and location records keyed by bus id
//! - **Broadcaster** - fans a full snapshot out to every open connection
//! - **ProtocolHandler** - validates client frames, mutates the store, triggers broadcasts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ ProtocolHandler │────▶│ StateStore  │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//!        ▲                    │
//!        │                    ▼
//!        │             ┌─────────────┐
//!        └─────────────│ Broadcaster │
//!                      └─────────────┘
//! ```

pub mod broadcaster;
pub mod error;
pub mod handler;
pub mod store;

pub use broadcaster::{Broadcaster, ConnectionId, Outgoing};
pub use error::CoreError;
pub use handler::{Origin, Outcome, ProtocolHandler, StatusView};
pub use store::{shared, Clock, SharedStore, StateStore, SystemClock};
