//! Infrastructure layer for the session crate.
//!
//! Contains the concrete adapters behind the application-layer ports:
//! TCP and in-memory transports, a simulated camera, and TOML config
//! persistence.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `camlink_core`, but MUST NOT be imported by the `application` layer.

pub mod camera;
pub mod storage;
pub mod transport;
