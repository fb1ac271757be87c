use serde::{Deserialize, Serialize};

use crate::types::{BotId, RequestId, ThreadId};

/// Trailing character appended to raw streamed responses that are not yet
/// complete. Pollers strip it and poll again; its absence marks the final
/// text. Never appears in [`PollReply::text`].
pub const CONTINUATION_MARKER: char = '💬';

/// Raw lookup body returned when a request has produced no output yet.
pub const NOT_FOUND: &str = "not found";

/// Plain-text healthcheck body.
pub const READY: &str = "I'm ready!";

/// Sentinel a planning engine emits when a prompt needs no reply.
pub const NO_RESPONSE_REQUIRED: &str = "!NO_RESPONSE_REQUIRED";

/// What the sentinel is rewritten to before callers see it.
pub const NO_RESPONSE_PLACEHOLDER: &str = "(no response needed)";

/// Handle returned by a successful submit. Callers keep it and poll with
/// the (bot_id, request_id) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub bot_id: BotId,
    pub thread_id: ThreadId,
}

/// One poll observation of a response in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReply {
    /// Cumulative response text so far, marker already stripped. Partial
    /// text is always a prefix of the final text.
    pub text: String,
    /// False while more output is expected for the same request.
    pub complete: bool,
}

impl PollReply {
    pub fn partial(text: impl Into<String>) -> Self {
        Self { text: text.into(), complete: false }
    }

    pub fn complete(text: impl Into<String>) -> Self {
        Self { text: text.into(), complete: true }
    }
}

/// Split a raw wire body into its text and completion flag. A single
/// trailing marker means more output is coming.
pub fn split_continuation(raw: &str) -> (&str, bool) {
    match raw.strip_suffix(CONTINUATION_MARKER) {
        Some(text) => (text, false),
        None => (raw, true),
    }
}

/// Compose the raw wire body: the marker is appended while incomplete.
pub fn compose_raw(text: &str, complete: bool) -> String {
    if complete {
        text.to_string()
    } else {
        format!("{text}{CONTINUATION_MARKER}")
    }
}
