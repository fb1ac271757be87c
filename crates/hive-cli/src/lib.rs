//! # hive-cli
//!
//! Command-line interface for the Hive runtime.
//!
//! ## Commands
//!
//! - `hive serve` — Start the runtime and HTTP server
//! - `hive status` — Show runtime status
//! - `hive config` — Show current configuration
//! - `hive init` — Initialize a new hive.toml

pub mod commands;

pub use commands::Cli;
