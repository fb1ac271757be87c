use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use hive_channels::{NullNotifier, Notifier, RequestChannel, SlackGateway, SlackNotifier};
use hive_config::HiveConfig;
use hive_core::{
    ALL_BOTS, BotConfig, BotId, PollReply, Request, RequestId, Result, ToolDescriptor,
};
use hive_engine::EngineFactory;
use hive_store::HiveStore;
use hive_tools::ToolRegistry;

use crate::scheduler::{CredentialRotator, NullRotator, ResetFlags, SessionScheduler};
use crate::session::{SessionRegistry, build_session};
use crate::tasks::TaskEngine;

/// Point-in-time view of the runtime, for `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    pub engine: String,
    pub uptime_secs: u64,
    pub ticks: u64,
    pub sessions: usize,
    pub in_flight: usize,
}

/// One bot as seen from the outside.
#[derive(Debug, Clone, Serialize)]
pub struct BotSummary {
    pub bot_id: BotId,
    pub bot_name: String,
    pub udf_active: bool,
    pub slack_active: bool,
    pub in_flight: usize,
    pub threads: usize,
    pub session_created_at: DateTime<Utc>,
}

/// Cheap-to-clone handle over the running pieces. The HTTP surface keeps
/// one in its state and clones it per request; CLI commands build one the
/// same way.
#[derive(Clone)]
pub struct RuntimeHandle {
    registry: SessionRegistry,
    channel: Arc<RequestChannel>,
    store: Arc<HiveStore>,
    reset_flags: ResetFlags,
    ticks: Arc<AtomicU64>,
    engine: String,
    started_at: DateTime<Utc>,
}

impl RuntimeHandle {
    pub fn new(
        registry: SessionRegistry,
        channel: Arc<RequestChannel>,
        store: Arc<HiveStore>,
        reset_flags: ResetFlags,
        ticks: Arc<AtomicU64>,
        engine: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            channel,
            store,
            reset_flags,
            ticks,
            engine: engine.into(),
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn channel(&self) -> &Arc<RequestChannel> {
        &self.channel
    }

    pub fn store(&self) -> &Arc<HiveStore> {
        &self.store
    }

    pub fn reset_flags(&self) -> &ResetFlags {
        &self.reset_flags
    }

    /// Submit caller text. `thread_id` of `None` (or empty) starts a fresh
    /// thread.
    pub fn submit(&self, bot_id: &str, thread_id: Option<&str>, text: &str) -> Result<Request> {
        self.channel.submit(bot_id, thread_id.unwrap_or(""), text)
    }

    pub async fn poll(&self, request: &Request) -> Result<Option<PollReply>> {
        self.channel.poll(request).await
    }

    /// Raw wire body for a request, action payloads included.
    pub async fn lookup(&self, bot_id: &str, request_id: RequestId) -> Result<Option<String>> {
        self.channel.lookup(bot_id, request_id).await
    }

    /// Register a tool whose implementation lives with a detached caller.
    /// The registration is persisted and survives a restart. An empty
    /// scope applies to every bot.
    pub fn register_client_tool(
        &self,
        scope: &str,
        descriptor: ToolDescriptor,
        timeout: Duration,
    ) -> Result<()> {
        let scope = if scope.is_empty() { ALL_BOTS } else { scope };
        self.store
            .upsert_client_tool(scope, &descriptor, timeout.as_secs())?;
        self.channel
            .tools()
            .register_remote(scope, descriptor, timeout);
        Ok(())
    }

    /// Remove a client tool from one scope. Returns whether anything was
    /// removed, from the registry or the store.
    pub fn unregister_client_tool(&self, scope: &str, name: &str) -> Result<bool> {
        let scope = if scope.is_empty() { ALL_BOTS } else { scope };
        let live = self.channel.tools().unregister(scope, name);
        let stored = self.store.delete_client_tool(scope, name)?;
        Ok(live || stored)
    }

    /// Persist a bot config and flag its session for rebuild on the next
    /// scheduler tick. Works for new bots and config changes alike.
    pub fn deploy_bot(&self, config: &BotConfig) -> Result<()> {
        self.store.upsert_bot(config)?;
        self.reset_flags.request(&config.bot_id);
        info!(bot_id = %config.bot_id, "bot deployed, session reset flagged");
        Ok(())
    }

    /// Flag a bot's session for rebuild without touching its config.
    pub fn reset_bot(&self, bot_id: &str) {
        self.reset_flags.request(bot_id);
    }

    pub async fn bots(&self) -> Vec<BotSummary> {
        let mut summaries = Vec::new();
        for bot_id in self.registry.bot_ids().await {
            let Some(session) = self.registry.get(&bot_id).await else {
                continue;
            };
            let config = session.config();
            summaries.push(BotSummary {
                bot_id,
                bot_name: config.bot_name.clone(),
                udf_active: config.udf_active,
                slack_active: config.slack_active,
                in_flight: session.in_flight(),
                threads: session.thread_count(),
                session_created_at: session.created_at(),
            });
        }
        summaries
    }

    pub async fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            engine: self.engine.clone(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            ticks: self.ticks.load(Ordering::Relaxed),
            sessions: self.registry.len().await,
            in_flight: self.channel.total_in_flight(),
        }
    }
}

/// Assembles the store, channel, sessions, and background loops, then
/// hands back the [`RuntimeHandle`] everything outside talks through.
pub struct Runtime;

impl Runtime {
    /// Start with production wiring: store at the configured path, Slack
    /// delivery when enabled, no credential rotation.
    pub async fn start(
        config: &HiveConfig,
        engines: Arc<dyn EngineFactory>,
    ) -> Result<RuntimeHandle> {
        let store = Arc::new(HiveStore::open(&config.store.db_path)?);
        let notifier: Arc<dyn Notifier> = if !config.slack.enabled {
            Arc::new(NullNotifier)
        } else if let Some(token) = &config.slack.bot_token {
            Arc::new(SlackNotifier::new(token.clone()))
        } else {
            warn!("slack enabled without a bot token, notifications go to the log");
            Arc::new(NullNotifier)
        };
        Self::start_with(config, store, engines, notifier, Arc::new(NullRotator)).await
    }

    /// Start with every seam injected, for tests and embedders.
    pub async fn start_with(
        config: &HiveConfig,
        store: Arc<HiveStore>,
        engines: Arc<dyn EngineFactory>,
        notifier: Arc<dyn Notifier>,
        rotator: Arc<dyn CredentialRotator>,
    ) -> Result<RuntimeHandle> {
        for bot in &config.runtime.seed_bots {
            store.upsert_bot(bot)?;
        }

        let tools = Arc::new(ToolRegistry::new());
        for (scope, descriptor, timeout_secs) in store.list_client_tools()? {
            tools.register_remote(scope, descriptor, Duration::from_secs(timeout_secs));
        }

        let channel = Arc::new(RequestChannel::new(tools));
        let slack = config
            .slack
            .enabled
            .then(|| Arc::new(SlackGateway::new(Arc::clone(&notifier))));

        let registry = SessionRegistry::new();
        for bot in store.list_bots()? {
            let session = build_session(&bot, engines.as_ref(), &channel, slack.as_deref());
            registry.insert(Arc::new(session)).await;
        }
        info!(
            sessions = registry.len().await,
            engine = %config.runtime.engine,
            "runtime assembled"
        );

        if config.slack.enabled
            && let Err(e) = rotator.rotate().await
        {
            warn!(error = %e, "startup credential rotation failed");
        }

        let reset_flags = ResetFlags::new();
        let ticks = Arc::new(AtomicU64::new(0));

        let scheduler = Arc::new(SessionScheduler::new(
            registry.clone(),
            Arc::clone(&channel),
            slack.clone(),
            Arc::clone(&engines),
            Arc::clone(&store),
            rotator,
            config.scheduler.clone(),
            reset_flags.clone(),
            Arc::clone(&ticks),
        ));
        tokio::spawn(scheduler.run());

        if config.tasks.enabled {
            let task_engine = Arc::new(TaskEngine::new(
                registry.clone(),
                Arc::clone(&channel),
                Arc::clone(&store),
                notifier,
                config.tasks.clone(),
            ));
            tokio::spawn(task_engine.run());
        }

        Ok(RuntimeHandle::new(
            registry,
            channel,
            store,
            reset_flags,
            ticks,
            config.runtime.engine.clone(),
        ))
    }
}
