//! Controller console.
//!
//! Each line typed on the controller becomes at most one protocol message:
//!
//! | input                | message                      |
//! |----------------------|------------------------------|
//! | `capture`, `photo`   | `CAPTURE_PHOTO`              |
//! | `flip`, `switch`     | `SWITCH_CAMERA`              |
//! | `flash`              | `TOGGLE_FLASH`               |
//! | `zoom in`, `+`       | `ZOOM_IN`                    |
//! | `zoom out`, `-`      | `ZOOM_OUT`                   |
//! | `zoom <factor>`      | `SET_ZOOM`, value = factor   |
//! | `mode <name>`        | `CHANGE_MODE`, value = name  |
//! | `suggest <title>`    | `APPLY_SUGGESTION`           |
//! | `ping`               | `PING`                       |
//!
//! `status`, `help` and `quit` are handled locally.

use std::net::SocketAddr;

use camlink_core::{CameraMode, Message, MessageType};
use camlink_session::PeerHandle;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  capture | photo        take a photo
  flip | switch          switch between front and back camera
  flash                  cycle the flash mode
  zoom in | +            zoom in one step
  zoom out | -           zoom out one step
  zoom <factor>          set the zoom factor, e.g. `zoom 2.5`
  mode <name>            photo, video, portrait, night, macro, food
  suggest <title>        apply a composition suggestion
  ping                   check the link
  status                 show the session and camera status
  quit                   disconnect and exit";

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command `{0}` (type `help` for a list)")]
    Unknown(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid zoom factor `{0}`")]
    InvalidZoom(String),

    #[error("unknown camera mode `{0}`")]
    InvalidMode(String),
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Send(Message),
    Status,
    Help,
    Quit,
}

/// Parses one console line.  Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleInput>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let send = |message_type: MessageType| -> Result<Option<ConsoleInput>, CommandError> {
        Ok(Some(ConsoleInput::Send(Message::new(message_type))))
    };
    match word.to_ascii_lowercase().as_str() {
        "capture" | "photo" => send(MessageType::CapturePhoto),
        "flip" | "switch" => send(MessageType::SwitchCamera),
        "flash" => send(MessageType::ToggleFlash),
        "+" => send(MessageType::ZoomIn),
        "-" => send(MessageType::ZoomOut),
        "ping" => send(MessageType::Ping),
        "zoom" => parse_zoom(rest),
        "mode" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("mode"));
            }
            let mode: CameraMode = rest.parse().map_err(|_| CommandError::InvalidMode(rest.to_string()))?;
            let msg = Message::new(MessageType::ChangeMode).with_value(mode.as_str());
            Ok(Some(ConsoleInput::Send(msg)))
        }
        "suggest" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("suggest"));
            }
            let msg = Message::new(MessageType::ApplySuggestion).with_action(rest);
            Ok(Some(ConsoleInput::Send(msg)))
        }
        "status" => Ok(Some(ConsoleInput::Status)),
        "help" | "?" => Ok(Some(ConsoleInput::Help)),
        "quit" | "exit" => Ok(Some(ConsoleInput::Quit)),
        _ => Err(CommandError::Unknown(word.to_string())),
    }
}

fn parse_zoom(arg: &str) -> Result<Option<ConsoleInput>, CommandError> {
    let message_type = match arg.to_ascii_lowercase().as_str() {
        "" => return Err(CommandError::MissingArgument("zoom")),
        "in" => MessageType::ZoomIn,
        "out" => MessageType::ZoomOut,
        factor => {
            let zoom: f32 = factor.parse().map_err(|_| CommandError::InvalidZoom(arg.to_string()))?;
            if !zoom.is_finite() || zoom <= 0.0 {
                return Err(CommandError::InvalidZoom(arg.to_string()));
            }
            return Ok(Some(ConsoleInput::Send(
                Message::new(MessageType::SetZoom).with_value(zoom.to_string()),
            )));
        }
    };
    Ok(Some(ConsoleInput::Send(Message::new(message_type))))
}

#[derive(Debug, Error, PartialEq)]
pub enum PeerSelectionError {
    #[error("no paired devices; add a [[peers]] entry to the config or pass --peer host:port")]
    NoPairedDevices,

    #[error("`{0}` is neither a paired device nor a host:port address")]
    UnknownPeer(String),
}

/// Picks the device to connect to.
///
/// `wanted` matches a paired peer by name (case-insensitive) or address.
/// A `host:port` that matches no paired peer is used as-is.  Without
/// `wanted` the first paired peer is chosen.
pub fn choose_peer(peers: &[PeerHandle], wanted: Option<&str>) -> Result<PeerHandle, PeerSelectionError> {
    let Some(wanted) = wanted.map(str::trim) else {
        return peers.first().cloned().ok_or(PeerSelectionError::NoPairedDevices);
    };
    if let Some(peer) = peers
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(wanted) || p.address == wanted)
    {
        return Ok(peer.clone());
    }
    if wanted.parse::<SocketAddr>().is_ok() {
        return Ok(PeerHandle::new(wanted, wanted));
    }
    Err(PeerSelectionError::UnknownPeer(wanted.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
