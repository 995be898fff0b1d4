//! Command-line arguments.
//!
//! Flags override the matching settings from the config file.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "camlink", version, about = "Share a phone camera or control one remotely")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "CAMLINK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Share this device's camera and wait for a controller.
    Host {
        /// Address to listen on, e.g. `0.0.0.0:24900`.
        #[arg(long, env = "CAMLINK_BIND")]
        bind: Option<SocketAddr>,

        /// Serve one controller, then exit.
        #[arg(long)]
        once: bool,
    },

    /// Connect to a host and drive its camera from the console.
    Controller {
        /// Paired peer name, or a `host:port` address.  Defaults to the
        /// first paired peer.
        #[arg(long)]
        peer: Option<String>,
    },

    /// Write a config file with default settings.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
