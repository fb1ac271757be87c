//! Mock planning engine for deterministic testing.
//!
//! Plays back pre-scripted turns without making any HTTP calls. Supports
//! the full run lifecycle: plain answers, streamed cumulative parts, and
//! tool delegations that pause the run until a result is fed back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::engine::*;
use hive_core::{ActionMessage, BotConfig, BotId, EngineThreadId, HiveError, RequestId, Result};

/// A mock engine that plays back pre-scripted turns.
///
/// # Example
/// ```
/// use hive_engine::MockEngine;
/// let engine = MockEngine::new("test")
///     .with_response("Hi there!");
/// ```
pub struct MockEngine {
    turns: Arc<Mutex<Vec<MockTurn>>>,
    /// Track all prompts received (for assertions in tests).
    pub prompts: Arc<Mutex<Vec<EnginePrompt>>>,
    /// Track all resumes received (for assertions in tests).
    pub resumes: Arc<Mutex<Vec<(String, Value)>>>,
    pending: Arc<Mutex<Vec<EngineChunk>>>,
    /// invocation_id → the run it pauses, so resume can continue it
    /// against the original request.
    paused: Arc<Mutex<HashMap<String, (RequestId, EngineThreadId)>>>,
    name: String,
}

/// A pre-scripted turn from the mock engine.
#[derive(Clone, Default)]
pub struct MockTurn {
    /// Cumulative text parts; the last one is the final text.
    pub parts: Vec<String>,
    /// Delegate a tool instead of answering:
    /// (invocation_id, tool_func_name, invocation_kwargs).
    pub action: Option<(String, String, Value)>,
    /// If set, the engine fails with this error instead.
    pub error: Option<String>,
}

impl MockTurn {
    /// A single-chunk text answer.
    pub fn text(text: &str) -> Self {
        Self {
            parts: vec![text.to_string()],
            ..Default::default()
        }
    }

    /// A streamed answer delivered as cumulative parts.
    pub fn streamed(parts: &[&str]) -> Self {
        Self {
            parts: parts.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    /// A tool delegation that pauses the run.
    pub fn action(invocation_id: &str, tool_func_name: &str, kwargs: Value) -> Self {
        Self {
            action: Some((
                invocation_id.to_string(),
                tool_func_name.to_string(),
                kwargs,
            )),
            ..Default::default()
        }
    }

    /// An engine failure.
    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl MockEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(vec![])),
            prompts: Arc::new(Mutex::new(vec![])),
            resumes: Arc::new(Mutex::new(vec![])),
            pending: Arc::new(Mutex::new(vec![])),
            paused: Arc::new(Mutex::new(HashMap::new())),
            name: name.into(),
        }
    }

    /// Queue a simple text answer.
    pub fn with_response(self, text: &str) -> Self {
        self.turns.lock().unwrap().push(MockTurn::text(text));
        self
    }

    /// Queue a streamed answer (cumulative parts, last one final).
    pub fn with_streamed_response(self, parts: &[&str]) -> Self {
        self.turns.lock().unwrap().push(MockTurn::streamed(parts));
        self
    }

    /// Queue a tool delegation.
    pub fn with_action(self, invocation_id: &str, tool_func_name: &str, kwargs: Value) -> Self {
        self.turns
            .lock()
            .unwrap()
            .push(MockTurn::action(invocation_id, tool_func_name, kwargs));
        self
    }

    /// Queue an engine failure.
    pub fn with_error(self, error: &str) -> Self {
        self.turns.lock().unwrap().push(MockTurn::error(error));
        self
    }

    /// Queue a fully custom turn.
    pub fn with_turn(self, turn: MockTurn) -> Self {
        self.turns.lock().unwrap().push(turn);
        self
    }

    /// Queue a turn on an engine already behind an `Arc`.
    pub fn queue_turn(&self, turn: MockTurn) {
        self.turns.lock().unwrap().push(turn);
    }

    /// Get all prompts that were submitted to this engine.
    pub fn recorded_prompts(&self) -> Arc<Mutex<Vec<EnginePrompt>>> {
        Arc::clone(&self.prompts)
    }

    /// Pop the next scripted turn, or a default filler answer.
    fn next_turn(&self) -> MockTurn {
        let mut turns = self.turns.lock().unwrap();
        if turns.is_empty() {
            MockTurn::text("(mock: no more scripted turns)")
        } else {
            turns.remove(0)
        }
    }

    fn emit(&self, request_id: RequestId, thread: EngineThreadId, turn: MockTurn) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();

        if let Some((invocation_id, tool_func_name, invocation_kwargs)) = turn.action {
            self.paused
                .lock()
                .unwrap()
                .insert(invocation_id.clone(), (request_id, thread));
            let payload = ActionMessage::ActionRequired {
                invocation_id,
                tool_func_name,
                invocation_kwargs,
            }
            .to_wire()?;
            pending.push(EngineChunk {
                request_id,
                thread,
                text: payload,
                complete: true,
            });
            return Ok(());
        }

        let last = turn.parts.len().saturating_sub(1);
        for (i, part) in turn.parts.into_iter().enumerate() {
            pending.push(EngineChunk {
                request_id,
                thread,
                text: part,
                complete: i == last,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PlanningEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, prompt: EnginePrompt) -> Result<()> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let turn = self.next_turn();
        if let Some(error) = turn.error {
            return Err(HiveError::Engine(error));
        }
        self.emit(prompt.request_id, prompt.thread, turn)
    }

    async fn resume(&self, invocation_id: &str, func_result: Value) -> Result<()> {
        self.resumes
            .lock()
            .unwrap()
            .push((invocation_id.to_string(), func_result));
        let Some((request_id, thread)) = self.paused.lock().unwrap().remove(invocation_id) else {
            return Err(HiveError::Engine(format!(
                "no paused run for invocation {invocation_id}"
            )));
        };
        let turn = self.next_turn();
        if let Some(error) = turn.error {
            return Err(HiveError::Engine(error));
        }
        self.emit(request_id, thread, turn)
    }

    fn drain(&self) -> Vec<EngineChunk> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory handing out mock engines, optionally pre-scripted per bot.
///
/// Session rebuilds ask the factory again, so a pre-inserted engine
/// survives a bot reset while an unscripted bot gets a fresh filler mock.
#[derive(Default)]
pub struct MockEngineFactory {
    engines: Mutex<HashMap<BotId, Arc<MockEngine>>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bot_id: impl Into<BotId>, engine: Arc<MockEngine>) {
        self.engines.lock().unwrap().insert(bot_id.into(), engine);
    }
}

impl EngineFactory for MockEngineFactory {
    fn build(&self, config: &BotConfig) -> Arc<dyn PlanningEngine> {
        if let Some(engine) = self.engines.lock().unwrap().get(&config.bot_id) {
            return Arc::clone(engine) as Arc<dyn PlanningEngine>;
        }
        Arc::new(MockEngine::new(config.bot_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn prompt(text: &str) -> EnginePrompt {
        EnginePrompt {
            request_id: Uuid::new_v4(),
            thread: Uuid::new_v4(),
            text: text.into(),
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_mock_text_response() {
        let engine = MockEngine::new("mock").with_response("Hi there!");
        let p = prompt("hello");
        engine.submit(p.clone()).await.unwrap();

        let chunks = engine.drain();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hi there!");
        assert!(chunks[0].complete);
        assert_eq!(chunks[0].request_id, p.request_id);
        assert!(engine.drain().is_empty());
    }

    #[tokio::test]
    async fn test_mock_streamed_parts_are_cumulative() {
        let engine = MockEngine::new("mock").with_streamed_response(&["Hi th", "Hi there!"]);
        engine.submit(prompt("hello")).await.unwrap();

        let chunks = engine.drain();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Hi th");
        assert!(!chunks[0].complete);
        assert_eq!(chunks[1].text, "Hi there!");
        assert!(chunks[1].complete);
        assert!(chunks[1].text.starts_with(&chunks[0].text));
    }

    #[tokio::test]
    async fn test_mock_action_pauses_then_resume_continues() {
        let engine = MockEngine::new("mock")
            .with_action("abc", "get_time", json!({}))
            .with_response("The time is 12:00.");
        let p = prompt("what time is it?");
        engine.submit(p.clone()).await.unwrap();

        let chunks = engine.drain();
        assert_eq!(chunks.len(), 1);
        let msg = ActionMessage::parse(&chunks[0].text).unwrap().unwrap();
        match msg {
            ActionMessage::ActionRequired {
                invocation_id,
                tool_func_name,
                ..
            } => {
                assert_eq!(invocation_id, "abc");
                assert_eq!(tool_func_name, "get_time");
            }
            other => panic!("wrong variant: {other:?}"),
        }

        engine.resume("abc", json!("12:00")).await.unwrap();
        let chunks = engine.drain();
        assert_eq!(chunks.len(), 1);
        // Continuation lands on the original request.
        assert_eq!(chunks[0].request_id, p.request_id);
        assert_eq!(chunks[0].text, "The time is 12:00.");
        assert!(chunks[0].complete);
    }

    #[tokio::test]
    async fn test_mock_resume_unknown_invocation_fails() {
        let engine = MockEngine::new("mock");
        let err = engine.resume("nope", json!(null)).await.unwrap_err();
        assert!(matches!(err, HiveError::Engine(_)));
    }

    #[tokio::test]
    async fn test_mock_error_turn() {
        let engine = MockEngine::new("mock").with_error("engine offline");
        let result = engine.submit(prompt("hello")).await;
        assert!(result.is_err());
        assert!(engine.drain().is_empty());
    }

    #[tokio::test]
    async fn test_mock_records_prompts_and_resumes() {
        let engine = MockEngine::new("mock")
            .with_action("abc", "get_time", json!({}))
            .with_response("done");
        engine.submit(prompt("what time?")).await.unwrap();
        engine.drain();
        engine.resume("abc", json!("12:00")).await.unwrap();

        let prompts = engine.recorded_prompts();
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].text, "what time?");

        let resumes = engine.resumes.lock().unwrap();
        assert_eq!(resumes.len(), 1);
        assert_eq!(resumes[0].0, "abc");
        assert_eq!(resumes[0].1, json!("12:00"));
    }

    #[tokio::test]
    async fn test_mock_turns_play_in_order() {
        let engine = MockEngine::new("mock")
            .with_response("first")
            .with_response("second");
        engine.submit(prompt("a")).await.unwrap();
        engine.submit(prompt("b")).await.unwrap();
        let chunks = engine.drain();
        assert_eq!(chunks[0].text, "first");
        assert_eq!(chunks[1].text, "second");

        // Script exhausted: filler answer, not an error.
        engine.submit(prompt("c")).await.unwrap();
        let chunks = engine.drain();
        assert_eq!(chunks[0].text, "(mock: no more scripted turns)");
    }

    #[tokio::test]
    async fn test_factory_returns_prescripted_engine() {
        let factory = MockEngineFactory::new();
        let scripted = Arc::new(MockEngine::new("eve").with_response("Hi there!"));
        factory.insert("eve", Arc::clone(&scripted));

        let config = BotConfig::minimal("eve", "Eve");
        let engine = factory.build(&config);
        engine
            .submit(EnginePrompt {
                request_id: Uuid::new_v4(),
                thread: Uuid::new_v4(),
                text: "hello".into(),
                tools: vec![],
            })
            .await
            .unwrap();
        assert_eq!(scripted.drain().len(), 1);

        // Unscripted bots get a fresh mock.
        let other = factory.build(&BotConfig::minimal("zoe", "Zoe"));
        assert_eq!(other.name(), "zoe");
    }
}
