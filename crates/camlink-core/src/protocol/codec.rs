//! Newline-delimited JSON codec for CamLink protocol messages.
//!
//! Wire format:
//! ```text
//! {"type":"<MessageType>","action":"<string>","value":"<string>","timestamp":<i64>}\n
//! ```
//! One UTF-8 JSON object per line.  The reader splits the stream on `\n` and
//! hands each line to [`decode_message`]; a bad line is rejected on its own
//! without affecting the lines around it.
//!
//! # Decoding policy
//!
//! - `type` is required and must be one of the thirteen known names.
//! - `action` and `value` default to the empty string when absent or `null`.
//! - `timestamp` defaults to `0` ("unknown") when absent.
//! - Unknown fields are ignored so newer peers can add fields.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::messages::{Message, MessageType};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line is not a JSON object of the expected shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The `type` field is missing.
    #[error("message has no type field")]
    MissingType,

    /// The `type` field names a type this build does not know.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Lenient shadow of [`Message`] used only for decoding.
#[derive(Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    message_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] as one JSON object followed by a single `\n`.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use camlink_core::protocol::{decode_message, encode_message};
/// use camlink_core::protocol::messages::{Message, MessageType};
///
/// let msg = Message::at(MessageType::ZoomIn, 42);
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(bytes.last(), Some(&b'\n'));
///
/// let line = std::str::from_utf8(&bytes).unwrap();
/// assert_eq!(decode_message(line).unwrap(), msg);
/// ```
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = serde_json::to_vec(msg).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Decodes one line into a [`Message`].
///
/// Trailing `\r` / `\n` are tolerated so callers can pass raw lines.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedMessage`] for invalid JSON,
/// [`ProtocolError::MissingType`] when `type` is absent, and
/// [`ProtocolError::UnknownMessageType`] for unrecognised type names.
pub fn decode_message(line: &str) -> Result<Message, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let wire: WireMessage =
        serde_json::from_str(line).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;

    let message_type: MessageType = wire
        .message_type
        .ok_or(ProtocolError::MissingType)?
        .parse()?;

    Ok(Message {
        message_type,
        action: wire.action.unwrap_or_default(),
        value: wire.value.unwrap_or_default(),
        timestamp: wire.timestamp.unwrap_or(0),
    })
}

/// Returns the current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
