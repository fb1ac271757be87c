//! # hive-config
//!
//! Configuration system for the Hive runtime. Reads from `hive.toml`,
//! environment variables, and CLI overrides — in that precedence order.
//!
//! Supports hot-reload via filesystem watcher.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::HiveConfig;
pub use schema::{ConfigWarning, WarningSeverity};
