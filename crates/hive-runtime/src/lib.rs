//! # hive-runtime
//!
//! Session lifecycle and the loops that drive it.
//!
//! A [`Session`] owns one bot's planning engine and input adapters. The
//! [`SessionScheduler`] ticks every session on a short interval, stepping
//! each one on its own task so a slow engine never starves the rest. The
//! [`TaskEngine`] is a second, slower loop that wakes bots up for
//! unattended work and reconciles their structured JSON responses against
//! the task store.
//!
//! [`Runtime::start`] wires all of it together and hands back a
//! [`RuntimeHandle`] the HTTP surface clones per request.

pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod tasks;

pub use runtime::{BotSummary, Runtime, RuntimeHandle, RuntimeStatus};
pub use scheduler::{CredentialRotator, NullRotator, ResetFlags, SessionScheduler};
pub use session::{Session, SessionRegistry, build_session};
pub use tasks::{TaskEngine, TaskResponse, task_prompt, validate_task_response};
