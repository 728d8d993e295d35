//! Codec trait and the JSON implementation.
//!
//! The wire is one JSON object per WebSocket text frame. The [`Codec`]
//! trait keeps the rest of the stack independent of that choice; a binary
//! codec could be swapped in behind the same interface.

use serde::{Serialize, de::DeserializeOwned};

use crate::{ClientMessage, ProtocolError};

/// Converts between Rust types and wire frames.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a text frame back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the frame is malformed or
    /// does not match the expected shape.
    fn decode<T: DeserializeOwned>(&self, frame: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] using `serde_json`.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, frame: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }
}

/// Result of decoding an inbound frame with unknown-type tolerance.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A recognized, well-formed message.
    Message(ClientMessage),
    /// Valid JSON with an unrecognized `type` tag. Ignored by the
    /// gateway (logged, not fatal) so old servers tolerate new clients.
    Unknown(String),
}

/// Decodes an inbound frame, separating the three §7 cases:
/// malformed JSON / missing fields → `Err`, unknown tag → `Unknown`,
/// well-formed known message → `Message`.
#[cfg(feature = "json")]
pub fn decode_inbound(frame: &str) -> Result<Inbound, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(frame).map_err(ProtocolError::Decode)?;

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::InvalidMessage("missing \"type\" field".into()))?;

    if !ClientMessage::KNOWN_TYPES.contains(&tag) {
        return Ok(Inbound::Unknown(tag.to_string()));
    }

    let msg: ClientMessage =
        serde_json::from_value(value).map_err(ProtocolError::Decode)?;
    Ok(Inbound::Message(msg))
}

// =========================================================================
// Tests
// =========================================================================
