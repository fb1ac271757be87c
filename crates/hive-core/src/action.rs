use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HiveError, Result};

/// Wire payload delegating a tool call to the entity on the other side of
/// the request channel, or carrying its result back.
///
/// Both directions share an `invocation_id`; every `action_required` is
/// answered by exactly one `action_result` on the same thread before the
/// originating request resolves. Neither payload is ever surfaced to a
/// caller as chat text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionMessage {
    ActionRequired {
        invocation_id: String,
        tool_func_name: String,
        #[serde(default)]
        invocation_kwargs: Value,
    },
    ActionResult {
        invocation_id: String,
        func_result: Value,
    },
}

impl ActionMessage {
    /// Classify a chunk of channel text.
    ///
    /// Returns `Ok(None)` for ordinary chat (non-JSON, or JSON without an
    /// `action_type` key), `Ok(Some(..))` for a well-formed action message,
    /// and `Err` for JSON that claims an `action_type` it does not honor.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let value: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        if value.get("action_type").is_none() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| HiveError::Protocol(e.to_string()))
    }

    pub fn invocation_id(&self) -> &str {
        match self {
            Self::ActionRequired { invocation_id, .. } => invocation_id,
            Self::ActionResult { invocation_id, .. } => invocation_id,
        }
    }

    /// Build the result message answering an `action_required`.
    pub fn result(invocation_id: impl Into<String>, func_result: Value) -> Self {
        Self::ActionResult {
            invocation_id: invocation_id.into(),
            func_result,
        }
    }

    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
