//! # camlink-core
//!
//! Shared library for CamLink containing the wire protocol, the session
//! state vocabulary, and the camera state payload.
//!
//! This crate is used by both the host and the controller side of a session.
//! It has zero dependencies on sockets, async runtimes, or image codecs.
//!
//! # Architecture overview
//!
//! CamLink lets two devices cooperate over a short-range link: the *host*
//! owns a camera and accepts remote commands, the *controller* sends
//! commands and receives a live preview plus status updates.
//!
//! - **`protocol`** – How messages travel over the stream.  Every message is
//!   one JSON object terminated by a newline (`{"type":"ZOOM_IN",...}\n`).
//!
//! - **`domain`** – Pure session vocabulary: connection states and the legal
//!   transitions between them, device roles and which message types each
//!   role acts on, and the camera state carried by `CAMERA_STATE` messages.

pub mod domain;
pub mod protocol;

pub use domain::camera::{CameraMode, CameraState, FlashMode};
pub use domain::session::{ConnectionState, DeviceRole, SessionSnapshot};
pub use protocol::codec::{decode_message, encode_message, now_millis, ProtocolError};
pub use protocol::messages::{Message, MessageType};
