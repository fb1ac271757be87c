use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a callable tool. Advertised to planning engines and
/// round-tripped over HTTP when a detached client registers one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name within a scope, e.g. "get_time".
    pub name: String,
    /// Human-readable description for the engine.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the keyword-arguments object.
    #[serde(default = "empty_schema")]
    pub parameters: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: empty_schema(),
        }
    }
}

/// Trait implemented by anything that can execute a delegated tool call.
///
/// `kwargs` is the keyword-arguments object from the action message. The
/// returned value is serialized into the `func_result` field verbatim;
/// errors are stringified and fed back to the engine, never raised to the
/// external caller.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, kwargs: Value) -> crate::Result<Value>;
}

/// Adapter turning a plain function into a [`ToolHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> crate::Result<Value> + Send + Sync,
{
    async fn invoke(&self, kwargs: Value) -> crate::Result<Value> {
        (self.0)(kwargs)
    }
}
