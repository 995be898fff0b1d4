//! camlink-app library entry point.
//!
//! The `camlink` binary is a thin shell around the session layer.  The parts
//! worth testing without a terminal live here:
//!
//! - **`cli`** – command-line arguments (`clap` derive).
//! - **`commands`** – the controller console: parses typed lines such as
//!   `zoom 2.5` or `mode night` into protocol messages, and picks the peer to
//!   connect to.

pub mod cli;
pub mod commands;
