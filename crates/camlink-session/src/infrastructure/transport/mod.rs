//! Transport adapters.
//!
//! - **`tcp`**    – Production transport over TCP sockets.
//! - **`memory`** – In-process loopback radio for tests and demos.

pub mod memory;
pub mod tcp;

pub use memory::{MemoryRadio, MemoryTransport};
pub use tcp::TcpTransport;
