//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in turning events into
//! bytes or back, never in networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown `event` name,
    /// missing fields, or wrongly typed values.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value decoded but is not meaningful, such as an unknown game
    /// mode name.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
