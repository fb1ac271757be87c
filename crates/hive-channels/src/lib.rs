//! # hive-channels
//!
//! The request/response surface between external callers and bot sessions.
//!
//! Callers submit user text and get back a [`Request`](hive_core::Request)
//! handle; sessions drain queued prompts, run them through their planning
//! engine, and deliver output back against the request. Polling never
//! blocks: a caller re-polls until the response is complete.
//!
//! When an engine delegates a client tool, the channel intercepts the
//! `action_required` payload during poll, invokes the tool through the
//! registry, and re-submits the `action_result` on the same thread, so a
//! polling caller only ever sees chat text. Tools registered remotely
//! have no in-process handler; their action payloads come out of the raw
//! lookup surface instead, and the detached caller answers them.

pub mod adapter;
pub mod channel;
pub mod slack;

pub use adapter::{InputAdapter, PendingPrompt, RequestAdapter};
pub use channel::RequestChannel;
pub use slack::{NullNotifier, Notifier, SlackAdapter, SlackGateway, SlackNotifier};
