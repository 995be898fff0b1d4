//! Camera implementations for the [`CameraControl`] port.
//!
//! Real camera drivers live outside this crate.  [`SimulatedCamera`] stands
//! in for one on desktops and in tests: it keeps the camera status in memory
//! and renders a synthetic moving test pattern as its viewfinder.
//!
//! [`CameraControl`]: crate::application::remote_commands::CameraControl

pub mod simulated;

pub use simulated::SimulatedCamera;
