//! Session vocabulary: connection states, device roles, and the rules that tie
//! them together.
//!
//! # Connection lifecycle
//!
//! ```text
//! Disconnected ──► Discovering ──► Connecting ──► Connected
//!       ▲               │               │             │
//!       └───────────────┴───────────────┴─────────────┘
//!              (failure, timeout, or explicit disconnect)
//! ```
//!
//! - `Discovering`: a role has been chosen.  The host is listening for a
//!   peer; the controller is picking one from its paired list.
//! - `Connecting`: a stream is being established.  On the host this is the
//!   brief moment between `accept` returning and the read loop starting.
//! - `Connected`: the stream is bound and the read loop is running.
//! - `Disconnected`: no stream, no role.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::messages::{MessageDirection, MessageType};

/// Session-wide connection state.  Exactly one value is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Discovering,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Returns `true` when moving from `self` to `next` is a legal transition.
    ///
    /// Any state may fall back to `Disconnected`; every other edge moves one
    /// step forward along the lifecycle.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Discovering)
                | (Discovering, Connecting)
                | (Connecting, Connected)
        )
    }

    /// Returns `true` while a connection attempt or session is in progress.
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Discovering => "DISCOVERING",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        };
        f.write_str(s)
    }
}

/// The part a device plays in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceRole {
    #[default]
    None,
    /// Operates the camera and accepts remote commands.
    Host,
    /// Sends commands and displays the received preview.
    Controller,
}

impl DeviceRole {
    /// Returns `true` when a device in this role should act on an inbound
    /// message of `message_type`.
    ///
    /// Only a host honours camera commands, only a controller consumes
    /// preview and status updates, and both sides handle link traffic.
    pub fn accepts(self, message_type: MessageType) -> bool {
        match (self, message_type.direction()) {
            (DeviceRole::None, _) => false,
            (_, MessageDirection::Either) => true,
            (DeviceRole::Host, MessageDirection::ToHost) => true,
            (DeviceRole::Controller, MessageDirection::ToController) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceRole::None => "NONE",
            DeviceRole::Host => "HOST",
            DeviceRole::Controller => "CONTROLLER",
        };
        f.write_str(s)
    }
}

/// A point-in-time view of the three observable session values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub role: DeviceRole,
    pub peer_name: String,
}

impl SessionSnapshot {
    /// Checks the cross-field invariant: an attempt in `Connecting` or a
    /// `Connected` session always has a role.
    pub fn is_consistent(&self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.role != DeviceRole::None
            }
            _ => true,
        }
    }

    /// Returns `true` when preview frames may be streamed from this device.
    pub fn may_stream_frames(&self) -> bool {
        self.role == DeviceRole::Host && self.state == ConnectionState::Connected
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
