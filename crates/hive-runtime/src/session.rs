use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hive_channels::{InputAdapter, PendingPrompt, RequestChannel, SlackGateway};
use hive_core::{
    ActionMessage, BotConfig, BotId, EngineThreadId, HiveError, Result, ThreadId, ToolDescriptor,
};
use hive_engine::{EngineFactory, EnginePrompt, PlanningEngine};
use hive_tools::ToolRegistry;

/// One live bot: its configuration, its planning engine, and the input
/// adapters it drains.
///
/// A session is immutable once built. Deploying new configuration or
/// resetting a bot builds a replacement session; the old one is swapped
/// out of the registry atomically and dropped.
pub struct Session {
    config: BotConfig,
    engine: Arc<dyn PlanningEngine>,
    adapters: Vec<Arc<dyn InputAdapter>>,
    tools: Arc<ToolRegistry>,
    /// External thread id to engine thread, grown on first sight and
    /// never forgotten for the session's lifetime.
    threads: Mutex<HashMap<ThreadId, EngineThreadId>>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        config: BotConfig,
        engine: Arc<dyn PlanningEngine>,
        adapters: Vec<Arc<dyn InputAdapter>>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            config,
            engine,
            adapters,
            tools,
            threads: Mutex::new(HashMap::new()),
            created_at: Utc::now(),
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.config.bot_id
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn PlanningEngine> {
        &self.engine
    }

    pub fn adapters(&self) -> &[Arc<dyn InputAdapter>] {
        &self.adapters
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Distinct conversation threads this session has seen.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Queued prompts plus requests still awaiting a complete response,
    /// summed over every adapter.
    pub fn in_flight(&self) -> usize {
        self.adapters.iter().map(|a| a.in_flight()).sum()
    }

    /// Drop every queued prompt and tracked request on every adapter.
    /// Used by the scheduler's overload valve; callers lose their
    /// outstanding requests.
    pub fn clear_in_flight(&self) {
        for adapter in &self.adapters {
            adapter.reset();
        }
    }

    /// One scheduler tick's worth of work: drain queued prompts into the
    /// engine, then route whatever the engine has produced back to the
    /// adapter that tracks each request.
    ///
    /// A failing prompt is logged and does not stop the rest of the
    /// drain; the first error is returned after the full pass so the
    /// scheduler can count the step as failed.
    pub async fn step(&self) -> Result<()> {
        let mut first_err = None;

        for adapter in &self.adapters {
            for prompt in adapter.drain_prompts() {
                if let Err(e) = self.dispatch(&prompt).await {
                    warn!(
                        bot_id = %self.config.bot_id,
                        adapter = adapter.id(),
                        request_id = %prompt.request_id,
                        error = %e,
                        "prompt dispatch failed"
                    );
                    first_err.get_or_insert(e);
                }
            }
        }

        self.route_chunks();

        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Hand one prompt to the engine.
    ///
    /// An `action_result` resumes the paused run it answers. Anything
    /// else is user text and begins or continues a run on the prompt's
    /// thread. `action_required` only ever travels engine-to-caller, so
    /// one arriving here is a protocol violation.
    async fn dispatch(&self, prompt: &PendingPrompt) -> Result<()> {
        match ActionMessage::parse(&prompt.text)? {
            Some(ActionMessage::ActionResult {
                invocation_id,
                func_result,
            }) => {
                debug!(
                    bot_id = %self.config.bot_id,
                    %invocation_id,
                    "resuming run with tool result"
                );
                self.engine.resume(&invocation_id, func_result).await
            }
            Some(ActionMessage::ActionRequired { invocation_id, .. }) => {
                Err(HiveError::Protocol(format!(
                    "action_required {invocation_id} submitted as a prompt"
                )))
            }
            None => {
                let thread = self.engine_thread(&prompt.thread_id);
                self.engine
                    .submit(EnginePrompt {
                        request_id: prompt.request_id,
                        thread,
                        text: prompt.text.clone(),
                        tools: self.advertised_tools(),
                    })
                    .await
            }
        }
    }

    /// Descriptors the engine may advertise on a run: everything
    /// resolvable for this bot, narrowed to `available_tools` when the
    /// config names any.
    fn advertised_tools(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self.tools.descriptors_for(&self.config.bot_id);
        if !self.config.available_tools.is_empty() {
            descriptors.retain(|d| self.config.available_tools.contains(&d.name));
        }
        descriptors
    }

    /// Deliver drained engine output to whichever adapter tracks each
    /// chunk's request. Chunks for requests nobody tracks are dropped.
    fn route_chunks(&self) {
        for chunk in self.engine.drain() {
            match self
                .adapters
                .iter()
                .find(|a| a.has_request(chunk.request_id))
            {
                Some(adapter) => adapter.deliver(chunk.request_id, &chunk.text, chunk.complete),
                None => debug!(
                    bot_id = %self.config.bot_id,
                    request_id = %chunk.request_id,
                    "dropping chunk for untracked request"
                ),
            }
        }
    }

    /// Map an external thread id to this session's engine thread,
    /// creating the mapping the first time the thread is seen.
    fn engine_thread(&self, external: &str) -> EngineThreadId {
        let mut threads = self.threads.lock();
        if let Some(existing) = threads.get(external) {
            return *existing;
        }
        let created = Uuid::new_v4();
        threads.insert(external.to_string(), created);
        debug!(
            bot_id = %self.config.bot_id,
            thread_id = %external,
            engine_thread = %created,
            "mapped new engine thread"
        );
        created
    }
}

/// Build a session for `config`, wiring its request adapter when the
/// request surface is enabled and its Slack adapter when a gateway is up
/// and the bot names a channel.
///
/// Attaching is idempotent, so rebuilding a bot's session hands the new
/// instance the same adapters the old one drained. Queued prompts and
/// tracked requests survive the swap; thread mappings and engine state
/// do not.
pub fn build_session(
    config: &BotConfig,
    engines: &dyn EngineFactory,
    channel: &RequestChannel,
    slack: Option<&SlackGateway>,
) -> Session {
    let engine = engines.build(config);
    let mut adapters: Vec<Arc<dyn InputAdapter>> = Vec::new();
    if config.udf_active {
        adapters.push(channel.attach_bot(&config.bot_id) as Arc<dyn InputAdapter>);
    } else {
        channel.detach_bot(&config.bot_id);
    }
    if let Some(gateway) = slack {
        if config.slack_active && let Some(channel_id) = &config.slack_channel_id {
            adapters.push(gateway.attach_bot(&config.bot_id, channel_id) as Arc<dyn InputAdapter>);
        } else {
            gateway.detach_bot(&config.bot_id);
        }
    }
    Session::new(config.clone(), engine, adapters, Arc::clone(channel.tools()))
}

/// All live sessions, keyed by bot id.
///
/// Scheduler ticks iterate a snapshot while HTTP handlers install and
/// remove sessions concurrently; every access goes through the inner
/// lock. Each bot also gets a step lock so two ticks never run the same
/// session at once.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<BotId, Arc<Session>>>>,
    step_locks: Arc<RwLock<HashMap<BotId, Arc<TokioMutex<()>>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session, replacing any existing one for the same bot.
    pub async fn insert(&self, session: Arc<Session>) {
        let bot_id = session.bot_id().to_string();
        let replaced = self
            .sessions
            .write()
            .await
            .insert(bot_id.clone(), session)
            .is_some();
        info!(%bot_id, replaced, "session installed");
    }

    pub async fn get(&self, bot_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(bot_id).cloned()
    }

    pub async fn contains(&self, bot_id: &str) -> bool {
        self.sessions.read().await.contains_key(bot_id)
    }

    /// Remove a bot's session and its step lock.
    pub async fn remove(&self, bot_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(bot_id);
        if removed.is_some() {
            self.step_locks.write().await.remove(bot_id);
            info!(%bot_id, "session removed");
        }
        removed
    }

    /// Consistent snapshot of every session for one tick's iteration.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn bot_ids(&self) -> Vec<BotId> {
        let mut ids: Vec<BotId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Per-bot lock held for the duration of one step.
    pub async fn step_lock(&self, bot_id: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.step_locks.write().await;
        Arc::clone(locks.entry(bot_id.to_string()).or_default())
    }
}
