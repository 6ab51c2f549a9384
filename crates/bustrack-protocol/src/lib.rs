//! # bustrack-protocol
//!
//! Wire protocol definitions for the bus location tracker.
//!
//! Clients and the server exchange JSON text frames discriminated by a
//! `type` field. The server never sends deltas: every push carries the
//! complete [`Snapshot`] of requests and locations.
//!
//! ## Frame Types
//!
//! - `request` / `response` / `location` - client to server
//! - `init` - full state sent once to a newly joined connection
//! - `update` - full state pushed to every connection after a mutation
//!
//! ## Example
//!
//! ```rust
//! use bustrack_protocol::{codec, ClientFrame};
//!
//! let frame = ClientFrame::request("bus1");
//! let text = codec::encode_client(&frame).unwrap();
//! assert_eq!(codec::decode_client(&text).unwrap(), frame);
//! ```

pub mod codec;
pub mod frames;
pub mod model;

pub use codec::{decode_client, decode_server, encode_client, encode_server, ProtocolError};
pub use frames::{ClientFrame, FrameKind, ServerFrame};
pub use model::{now_millis, BusLocation, BusRequest, Decision, RequestStatus, Snapshot, Timestamp};
