//! camlink-session library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `camlink` binary share the same module tree.
//!
//! # What does the session layer do?
//!
//! It turns a raw, lossy, connection-oriented byte stream into a reliable
//! two-party session:
//!
//! 1. Establishes the link: the host listens and accepts, the controller
//!    picks a paired peer and connects (trying several connection modes).
//! 2. Tracks the observable session values (connection state, device role,
//!    peer name) and enforces the legal transitions between them.
//! 3. Runs one read loop and one write pump per stream: inbound lines are
//!    decoded and handed to the registered handler in wire order, outbound
//!    messages are written by a single writer in call order.
//! 4. Streams rate-limited preview frames from host to controller.
//! 5. Tears everything down on disconnect, stream failure, or shutdown.

/// Application layer: session state machine, manager, and use cases.
pub mod application;

/// Infrastructure layer: transports, camera adapters, and config storage.
pub mod infrastructure;

pub use application::manager::{PendingConnection, SessionManager};
pub use application::session::SessionError;
pub use application::transport::{PeerHandle, TransportError};
