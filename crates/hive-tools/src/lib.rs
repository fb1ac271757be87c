//! # hive-tools
//!
//! The client-tool registry. Tools are registered per bot or globally
//! (`_ALL_BOTS_`), each with an invocation timeout; the request channel
//! resolves and invokes them when an engine delegates a call.

pub mod registry;

pub use registry::{ToolBinding, ToolRegistration, ToolRegistry};
