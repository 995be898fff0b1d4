//! Application layer of the session crate.
//!
//! # What lives here? (for beginners)
//!
//! Everything that decides *what happens* in a session, written against
//! traits instead of concrete sockets or cameras:
//!
//! - **`transport`** – The ports the session talks through: [`Transport`],
//!   [`Acceptor`], [`PermissionCheck`], plus the connection-strategy list and
//!   the shared [`TransportError`].  Infrastructure provides TCP and
//!   in-memory implementations.
//!
//! - **`config`** – [`SessionConfig`]: timeouts, frame rate limit, queue
//!   depth, keepalive and preview timing.
//!
//! - **`session`** – The session core: observable state/role/peer values,
//!   the transition table, stream binding, and the read loop, write pump and
//!   ping pump that run for each bound stream.
//!
//! - **`manager`** – [`SessionManager`], the public façade: start as host or
//!   controller, connect, send, disconnect, subscribe.
//!
//! - **`frame_encoder`** – Downsample, JPEG-compress and base64-encode
//!   preview frames, rate-limited to one frame per interval.
//!
//! - **`remote_commands`** – Role-aware dispatch of inbound messages: the
//!   host drives the camera, the controller keeps the latest preview and
//!   camera status.
//!
//! - **`stream_preview`** – The host's preview loop and camera status
//!   broadcast.
//!
//! [`Transport`]: transport::Transport
//! [`Acceptor`]: transport::Acceptor
//! [`PermissionCheck`]: transport::PermissionCheck
//! [`TransportError`]: transport::TransportError
//! [`SessionConfig`]: config::SessionConfig
//! [`SessionManager`]: manager::SessionManager

pub mod config;
pub mod frame_encoder;
pub mod manager;
pub mod remote_commands;
pub mod session;
pub mod stream_preview;
pub mod transport;
