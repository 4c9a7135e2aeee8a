//! Wire frames exchanged between chat clients and the relay server.
//!
//! Frames travel as WebSocket text messages carrying JSON. Inbound frames
//! ([`ClientFrame`]) are adjacently tagged on `type` with a `payload` object;
//! outbound frames ([`ServerFrame`]) are flat `{text, sender}` objects. The
//! payload fields are individually optional at the decode layer; the relay
//! validates them per frame kind, so a frame with a missing field still
//! decodes and can be rejected with a diagnostic instead of a parse error.

use serde::{Deserialize, Serialize};

/// Message content that signals a typing indicator rather than displayable text.
pub const TYPING_SENTINEL: &str = "__TYPING__";

/// Sender name carried by relay-generated notices (join/leave/error).
pub const SYSTEM_SENDER: &str = "System";

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Frames sent by clients to the relay server.
///
/// A frame whose `type` is not recognized decodes to [`ClientFrame::Unknown`]
/// rather than failing, so the relay can drop it without treating the
/// connection as misbehaving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Join a room under a display name, leaving any previous room.
    Join {
        /// Room to join. Required; the relay drops join frames without it.
        #[serde(rename = "roomId", default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        /// Display name announced to other room members.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },

    /// Send a message to the current room.
    ///
    /// The literal content [`TYPING_SENTINEL`] signals a typing indicator
    /// instead of a displayable message.
    Chat {
        /// Message content. Required; the relay drops chat frames without it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Any frame with an unrecognized `type` value.
    #[serde(other)]
    Unknown,
}

/// Frames sent by the relay server to clients.
///
/// `sender` is [`SYSTEM_SENDER`] for join/leave/error notices and the
/// originating member's display name for chat messages and typing indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Message content, or [`TYPING_SENTINEL`] for a typing indicator.
    pub text: String,
    /// Display name of the originator, or [`SYSTEM_SENDER`].
    pub sender: String,
}

impl ServerFrame {
    /// Creates a relay-generated notice attributed to [`SYSTEM_SENDER`].
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: SYSTEM_SENDER.to_string(),
        }
    }

    /// Creates a frame carrying a member's message or typing indicator.
    #[must_use]
    pub fn member(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: sender.into(),
        }
    }
}

/// Decodes a [`ClientFrame`] from a JSON text payload.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not valid JSON or does
/// not match the frame envelope (missing `type`, or a known `type` with no
/// `payload` object).
pub fn decode_client(text: &str) -> Result<ClientFrame, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ClientFrame`] into a JSON text payload.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerFrame`] from a JSON text payload.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not a valid
/// `{text, sender}` object.
pub fn decode_server(text: &str) -> Result<ServerFrame, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerFrame`] into a JSON text payload.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}
