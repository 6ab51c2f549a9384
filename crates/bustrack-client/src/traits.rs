//! Transport abstraction for clients.
//!
//! The reducer and location sharing only need somewhere to put frames;
//! [`Outbound`] is that seam, so both can be driven without a socket.

use bustrack_protocol::{ClientFrame, ServerFrame};
use std::sync::Arc;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No open connection to send on.
    #[error("Not connected to server")]
    NotConnected,

    /// Connection task has gone away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] bustrack_protocol::ProtocolError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Something a client can hand protocol frames to.
pub trait Outbound: Send + Sync {
    /// Check if frames can currently be sent.
    fn is_open(&self) -> bool;

    /// Send a frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] while the connection is down.
    fn send(&self, frame: ClientFrame) -> Result<(), TransportError>;
}

impl<T: Outbound + ?Sized> Outbound for Arc<T> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// Events produced by a persistent connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection (re)established; an `init` frame follows.
    Connected,
    /// A snapshot from the server.
    Frame(ServerFrame),
    /// Connection lost. `error` is set when the drop was not a clean close.
    Disconnected {
        /// Reason for an abnormal drop.
        error: Option<String>,
    },
}
