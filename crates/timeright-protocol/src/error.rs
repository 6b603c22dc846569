//! Error types for the protocol layer.
//!
//! The `Display` text of the request-side variants is exactly what the
//! push channel echoes back to a client in an `error` frame, so changing
//! these strings changes the wire protocol.

/// Errors that can occur while encoding frames or parsing client requests.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing an outbound frame failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The inbound frame is not valid JSON.
    #[error("Invalid JSON format")]
    InvalidJson(#[source] serde_json::Error),

    /// The inbound frame parsed, but its `type` field names no known request.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// The request type is known but its payload is unusable.
    #[error("{0}")]
    InvalidMessage(String),
}
