//! # hive-engine
//!
//! Abstraction layer over planning engines — the opaque LLM seam behind
//! every bot session. Engines accept prompts, pause on client-tool
//! delegations, and emit cumulative output chunks that the runtime routes
//! back to the originating request.

pub mod engine;
pub mod mock;

pub use engine::{EngineChunk, EngineFactory, EnginePrompt, PlanningEngine};
pub use mock::{MockEngine, MockEngineFactory, MockTurn};
