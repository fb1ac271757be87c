//! # hive-store
//!
//! SQLite persistence for the Hive runtime: bot configurations, task
//! records, task run history, and client-tool registrations.

pub mod store;

pub use store::HiveStore;
