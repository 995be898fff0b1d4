//! Message types for the CamLink wire protocol.
//!
//! # Message envelope
//!
//! Every message shares the same four-field envelope:
//!
//! ```json
//! {"type":"TOGGLE_FLASH","action":"","value":"","timestamp":1730000000000}
//! ```
//!
//! - `type` – one of the thirteen [`MessageType`] names.
//! - `action` – optional free-form verb (e.g. the suggestion title for
//!   `APPLY_SUGGESTION`).  Empty when unused.
//! - `value` – optional payload.  Base64 JPEG for `PREVIEW_FRAME`, a nested
//!   JSON document for `CAMERA_STATE`, a number for `SET_ZOOM`.
//! - `timestamp` – epoch milliseconds at send time.
//!
//! # Message directions
//!
//! | Direction            | Types                                                        |
//! |----------------------|--------------------------------------------------------------|
//! | controller → host    | CAPTURE_PHOTO, SWITCH_CAMERA, TOGGLE_FLASH, ZOOM_IN, ZOOM_OUT, SET_ZOOM, CHANGE_MODE, APPLY_SUGGESTION |
//! | host → controller    | PREVIEW_FRAME, CAMERA_STATE, SUGGESTION_UPDATE               |
//! | either way           | PING, ACK                                                    |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::codec::{now_millis, ProtocolError};

/// The closed set of message types understood by both peers.
///
/// Serialized with its `SCREAMING_SNAKE_CASE` name, so `ZoomIn` travels as
/// `"ZOOM_IN"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    CapturePhoto,
    SwitchCamera,
    ToggleFlash,
    ZoomIn,
    ZoomOut,
    SetZoom,
    ChangeMode,
    ApplySuggestion,
    PreviewFrame,
    CameraState,
    SuggestionUpdate,
    Ping,
    Ack,
}

/// Which side of a session a message type is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// A command the controller sends for the host's camera to execute.
    ToHost,
    /// A status update the host publishes for the controller to display.
    ToController,
    /// Link-level traffic either side may send.
    Either,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 13] = [
        MessageType::CapturePhoto,
        MessageType::SwitchCamera,
        MessageType::ToggleFlash,
        MessageType::ZoomIn,
        MessageType::ZoomOut,
        MessageType::SetZoom,
        MessageType::ChangeMode,
        MessageType::ApplySuggestion,
        MessageType::PreviewFrame,
        MessageType::CameraState,
        MessageType::SuggestionUpdate,
        MessageType::Ping,
        MessageType::Ack,
    ];

    /// Returns the wire name of this type (e.g. `"CAPTURE_PHOTO"`).
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::CapturePhoto => "CAPTURE_PHOTO",
            MessageType::SwitchCamera => "SWITCH_CAMERA",
            MessageType::ToggleFlash => "TOGGLE_FLASH",
            MessageType::ZoomIn => "ZOOM_IN",
            MessageType::ZoomOut => "ZOOM_OUT",
            MessageType::SetZoom => "SET_ZOOM",
            MessageType::ChangeMode => "CHANGE_MODE",
            MessageType::ApplySuggestion => "APPLY_SUGGESTION",
            MessageType::PreviewFrame => "PREVIEW_FRAME",
            MessageType::CameraState => "CAMERA_STATE",
            MessageType::SuggestionUpdate => "SUGGESTION_UPDATE",
            MessageType::Ping => "PING",
            MessageType::Ack => "ACK",
        }
    }

    /// Returns which side of the session this type is addressed to.
    pub fn direction(self) -> MessageDirection {
        match self {
            MessageType::CapturePhoto
            | MessageType::SwitchCamera
            | MessageType::ToggleFlash
            | MessageType::ZoomIn
            | MessageType::ZoomOut
            | MessageType::SetZoom
            | MessageType::ChangeMode
            | MessageType::ApplySuggestion => MessageDirection::ToHost,
            MessageType::PreviewFrame | MessageType::CameraState | MessageType::SuggestionUpdate => {
                MessageDirection::ToController
            }
            MessageType::Ping | MessageType::Ack => MessageDirection::Either,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMessageType(s.to_string()))
    }
}

/// One protocol message.
///
/// Messages are immutable value objects: two messages with the same fields
/// are the same message.  Field order here is the key order on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub action: String,
    pub value: String,
    pub timestamp: i64,
}

impl Message {
    /// Creates a message of `message_type` stamped with the current time.
    pub fn new(message_type: MessageType) -> Self {
        Self::at(message_type, now_millis())
    }

    /// Creates a message with an explicit timestamp (epoch milliseconds).
    pub fn at(message_type: MessageType, timestamp: i64) -> Self {
        Self {
            message_type,
            action: String::new(),
            value: String::new(),
            timestamp,
        }
    }

    /// Returns this message with `action` replaced.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Returns this message with `value` replaced.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Builds the `ACK` that answers this message.
    ///
    /// The acknowledgement echoes the original timestamp in `action` so the
    /// sender can measure round-trip time.
    pub fn ack(&self) -> Self {
        Message::new(MessageType::Ack).with_action(self.timestamp.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
