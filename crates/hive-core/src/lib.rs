//! # hive-core
//!
//! Core types, traits, and primitives for the Hive multi-bot runtime.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod action;
pub mod error;
pub mod json;
pub mod request;
pub mod task;
pub mod tool;
pub mod types;

pub use action::ActionMessage;
pub use error::{HiveError, Result};
pub use json::extract_json;
pub use request::{
    CONTINUATION_MARKER, NO_RESPONSE_PLACEHOLDER, NO_RESPONSE_REQUIRED, NOT_FOUND, PollReply,
    READY, Request, compose_raw, split_continuation,
};
pub use task::{TASK_TIME_FORMAT, TaskRecord, TaskRunRecord};
pub use tool::{FnHandler, ToolDescriptor, ToolHandler};
pub use types::*;
