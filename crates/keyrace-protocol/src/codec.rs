//! Codec trait and implementations for serializing/deserializing events.
//!
//! The gateway never calls `serde_json` directly; it holds something that
//! implements [`Codec`]. Browser clients speak JSON, so [`JsonCodec`] is
//! the only implementation shipped today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the server keeps one codec in shared
/// state and every connection task uses it.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Output is always valid UTF-8, so the transport sends it as text frames.
///
/// ## Example
///
/// ```rust
/// use keyrace_protocol::{ClientEvent, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let event: ClientEvent =
///     codec.decode(br#"{"event":"start_game","data":{"roomId":"ab12cd"}}"#).unwrap();
/// match event {
///     ClientEvent::StartGame(start) => assert_eq!(start.room_id.as_str(), "AB12CD"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientEvent, ServerEvent};

    #[test]
    fn test_json_codec_encode_is_utf8() {
        let bytes = JsonCodec.encode(&ServerEvent::Pong(crate::Pong {
            client_time: 1,
            server_time: 2,
        }))
        .unwrap();
        assert!(std::str::from_utf8(&bytes).is_ok());
    }

    #[test]
    fn test_json_codec_decode_garbage_is_decode_error() {
        let result: Result<ClientEvent, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_unknown_event_is_decode_error() {
        let result: Result<ClientEvent, _> =
            JsonCodec.decode(br#"{"event":"teleport","data":{}}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_missing_field_is_decode_error() {
        // update_progress without `progress`.
        let result: Result<ClientEvent, _> = JsonCodec
            .decode(br#"{"event":"update_progress","data":{"roomId":"ABC123","wpm":10}}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
