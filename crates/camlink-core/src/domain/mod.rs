//! Domain entities for CamLink.
//!
//! This module contains pure session rules with no infrastructure dependencies:
//! nothing in here opens a socket, spawns a task, or touches a camera.  The
//! session layer in `camlink-session` enforces these rules at runtime.

/// Camera status payload carried inside `CAMERA_STATE` messages.
pub mod camera;

/// Connection states, device roles, and the transition table.
pub mod session;
