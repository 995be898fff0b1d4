//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory, writes it back, and falls back to defaults on first run.

pub mod config;
