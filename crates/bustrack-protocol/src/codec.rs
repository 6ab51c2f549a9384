//! Codec for encoding and decoding tracker frames.
//!
//! Frames travel as JSON text, one frame per WebSocket message.

use thiserror::Error;

use crate::frames::{ClientFrame, ServerFrame};

/// Maximum accepted frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Payload is not a valid frame (bad JSON, unknown type, missing or mistyped field).
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

fn check_size(text: &str) -> Result<(), ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(())
}

/// Encode a client frame to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_client(frame: &ClientFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Encode a server frame to JSON text.
///
/// Server frames are not size-checked; a snapshot grows with the number of buses.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_server(frame: &ServerFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a client frame from JSON text.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid client frame.
pub fn decode_client(text: &str) -> Result<ClientFrame, ProtocolError> {
    check_size(text)?;
    Ok(serde_json::from_str(text)?)
}

/// Decode a server frame from JSON text.
///
/// # Errors
///
/// Returns an error if the text is not a valid server frame.
pub fn decode_server(text: &str) -> Result<ServerFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Decision;

    #[test]
    fn test_decode_location() {
        let frame = decode_client(r#"{"type":"location","busId":"bus1","lat":1.0,"lng":2.5}"#)
            .unwrap();
        assert_eq!(frame, ClientFrame::location("bus1", 1.0, 2.5));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases = [
            "not json",
            r#"{"busId":"bus1"}"#,
            r#"{"type":"teleport","busId":"bus1"}"#,
            r#"{"type":"request"}"#,
            r#"{"type":"response","busId":"bus1","response":"maybe"}"#,
            r#"{"type":"location","busId":"bus1","lat":"north","lng":2.0}"#,
            r#"{"type":"location","busId":"bus1","lat":1.0}"#,
        ];

        for case in cases {
            assert!(
                matches!(decode_client(case), Err(ProtocolError::Json(_))),
                "expected rejection for {case}"
            );
        }
    }

    #[test]
    fn test_decode_response_decision() {
        let frame =
            decode_client(r#"{"type":"response","busId":"bus9","response":"rejected"}"#).unwrap();
        assert_eq!(frame, ClientFrame::response("bus9", Decision::Rejected));
    }

    #[test]
    fn test_frame_too_large() {
        let text = format!(
            r#"{{"type":"request","busId":"{}"}}"#,
            "b".repeat(MAX_FRAME_SIZE)
        );
        match decode_client(&text) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_server_tolerates_missing_maps() {
        let frame = decode_server(r#"{"type":"init"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Init(ref s) if s.is_empty()));
    }
}
