//! Camera status as published by the host in `CAMERA_STATE` messages.
//!
//! The state travels as a JSON document *inside* the `value` string of the
//! outer envelope:
//!
//! ```json
//! {"type":"CAMERA_STATE","action":"","value":"{\"zoom\":2.0,\"flash\":\"ON\",\"mode\":\"PHOTO\"}","timestamp":1}
//! ```
//!
//! Existing peers expect this double encoding, so it is kept.  Consumers run a
//! second decode pass with [`CameraState::from_wire`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;
use crate::protocol::messages::{Message, MessageType};

/// Flash setting of the host camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlashMode {
    #[default]
    Off,
    On,
    Auto,
}

/// Capture mode of the host camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraMode {
    #[default]
    Photo,
    Video,
    Portrait,
    Night,
    Macro,
    Food,
}

impl CameraMode {
    pub const ALL: [CameraMode; 6] = [
        CameraMode::Photo,
        CameraMode::Video,
        CameraMode::Portrait,
        CameraMode::Night,
        CameraMode::Macro,
        CameraMode::Food,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CameraMode::Photo => "PHOTO",
            CameraMode::Video => "VIDEO",
            CameraMode::Portrait => "PORTRAIT",
            CameraMode::Night => "NIGHT",
            CameraMode::Macro => "MACRO",
            CameraMode::Food => "FOOD",
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraMode {
    type Err = ProtocolError;

    /// Parses a mode name case-insensitively (`"night"` and `"NIGHT"` both work).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        CameraMode::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| ProtocolError::MalformedMessage(format!("unknown camera mode: {s}")))
    }
}

/// Snapshot of the host camera published after every state-changing command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraState {
    pub zoom: f32,
    pub flash: FlashMode,
    pub mode: CameraMode,
}

impl CameraState {
    /// Encodes the state as the inner JSON document carried in `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails (e.g. a
    /// non-finite zoom factor).
    pub fn to_wire(&self) -> Result<String, ProtocolError> {
        if !self.zoom.is_finite() {
            return Err(ProtocolError::Encode(format!("zoom is not finite: {}", self.zoom)));
        }
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decodes the inner JSON document from a `CAMERA_STATE` message's `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] if the document is not a
    /// valid camera state.
    pub fn from_wire(value: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(value).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    /// Wraps this state in a `CAMERA_STATE` message stamped with the current time.
    ///
    /// # Errors
    ///
    /// See [`CameraState::to_wire`].
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        Ok(Message::new(MessageType::CameraState).with_value(self.to_wire()?))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
