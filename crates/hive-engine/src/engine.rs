use async_trait::async_trait;
use hive_core::{BotConfig, EngineThreadId, RequestId, Result, ToolDescriptor};
use serde_json::Value;
use std::sync::Arc;

/// A prompt handed to an engine. Begins or continues a run on `thread`;
/// everything the run produces is delivered against `request_id`.
#[derive(Debug, Clone)]
pub struct EnginePrompt {
    pub request_id: RequestId,
    pub thread: EngineThreadId,
    pub text: String,
    /// Tools the engine may advertise for this run. Resolved per prompt
    /// because client registrations come and go at runtime.
    pub tools: Vec<ToolDescriptor>,
}

/// One unit of engine output.
///
/// `text` is cumulative: a later chunk for the same request always extends
/// an earlier one, and the chunk with `complete` set carries the final
/// text. A run that delegates a tool completes with the action payload as
/// its text; the channel intercepts it before any caller can see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineChunk {
    pub request_id: RequestId,
    pub thread: EngineThreadId,
    pub text: String,
    pub complete: bool,
}

/// Trait implemented by each planning engine adapter.
///
/// One instance serves one session. Runs are keyed by thread; a run that
/// emitted an `action_required` stays paused under its invocation id until
/// `resume` feeds the result back, and its continuation is delivered
/// against the run's original request.
#[async_trait]
pub trait PlanningEngine: Send + Sync {
    /// Human-readable name, e.g. "mock", "anthropic/claude-sonnet-4".
    fn name(&self) -> &str;

    /// Begin or continue a run with user text.
    async fn submit(&self, prompt: EnginePrompt) -> Result<()>;

    /// Feed a client-tool result into the paused run for `invocation_id`.
    async fn resume(&self, invocation_id: &str, func_result: Value) -> Result<()>;

    /// Collect every chunk produced since the last drain. Never blocks.
    fn drain(&self) -> Vec<EngineChunk>;

    /// Check the engine is reachable.
    async fn health_check(&self) -> Result<()>;
}

/// Builds one engine per session. The runtime owns a single factory and
/// calls it for every session build and rebuild.
pub trait EngineFactory: Send + Sync {
    fn build(&self, config: &BotConfig) -> Arc<dyn PlanningEngine>;
}
