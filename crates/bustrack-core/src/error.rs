//! Core errors.

use thiserror::Error;

/// Reasons a client frame is refused before it reaches the store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bus id was empty.
    #[error("busId must be a non-empty string")]
    EmptyBusId,

    /// Payload could not be decoded.
    #[error(transparent)]
    Protocol(#[from] bustrack_protocol::ProtocolError),
}
