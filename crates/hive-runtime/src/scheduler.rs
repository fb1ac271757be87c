use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use hive_channels::{RequestChannel, SlackGateway};
use hive_config::schema::SchedulerConfig;
use hive_core::{BotId, Result};
use hive_engine::EngineFactory;
use hive_store::HiveStore;

use crate::session::{SessionRegistry, build_session};

/// External credential-rotation seam, invoked on a long fixed interval.
/// Failures are logged and retried on the next interval, never sooner.
#[async_trait]
pub trait CredentialRotator: Send + Sync {
    async fn rotate(&self) -> Result<()>;
}

/// Rotator used when nothing needs rotating.
#[derive(Default)]
pub struct NullRotator;

#[async_trait]
impl CredentialRotator for NullRotator {
    async fn rotate(&self) -> Result<()> {
        Ok(())
    }
}

/// Per-bot reset requests, raised by deploys and drained once per tick.
#[derive(Clone, Default)]
pub struct ResetFlags(Arc<Mutex<HashSet<BotId>>>);

impl ResetFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, bot_id: &str) {
        self.0.lock().insert(bot_id.to_string());
    }

    pub fn is_requested(&self, bot_id: &str) -> bool {
        self.0.lock().contains(bot_id)
    }

    /// Take every flagged bot, sorted for deterministic processing.
    pub fn drain(&self) -> Vec<BotId> {
        let mut ids: Vec<BotId> = std::mem::take(&mut *self.0.lock()).into_iter().collect();
        ids.sort();
        ids
    }
}

/// What one tick did, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions whose step was spawned this tick.
    pub stepped: usize,
    /// Sessions skipped because their previous step is still running.
    pub skipped: usize,
    /// Sessions rebuilt from a reset flag.
    pub rebuilt: usize,
    /// Whether the overload valve fired and aborted in-flight steps.
    pub emergency_reset: bool,
}

/// The periodic driver over every registered session.
///
/// Each tick snapshots the registry and spawns one step per session on
/// its own task; steps of one tick start together and the next tick does
/// not wait for them. A session whose previous step is still running is
/// skipped (its per-bot lock is held), so a slow engine delays only its
/// own bot.
///
/// The overload valve is a safety stop, not a graceful drain: when the
/// number of in-flight steps crosses the high-water mark, every one of
/// them is aborted and the tick interval is reinstalled at the emergency
/// cadence. Callers lose whatever those steps were producing.
pub struct SessionScheduler {
    registry: SessionRegistry,
    channel: Arc<RequestChannel>,
    slack: Option<Arc<SlackGateway>>,
    engines: Arc<dyn EngineFactory>,
    store: Arc<HiveStore>,
    rotator: Arc<dyn CredentialRotator>,
    config: SchedulerConfig,
    reset_flags: ResetFlags,
    ticks: Arc<AtomicU64>,
    steps: tokio::sync::Mutex<JoinSet<()>>,
    last_rotation: Mutex<Instant>,
}

impl SessionScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: SessionRegistry,
        channel: Arc<RequestChannel>,
        slack: Option<Arc<SlackGateway>>,
        engines: Arc<dyn EngineFactory>,
        store: Arc<HiveStore>,
        rotator: Arc<dyn CredentialRotator>,
        config: SchedulerConfig,
        reset_flags: ResetFlags,
        ticks: Arc<AtomicU64>,
    ) -> Self {
        Self {
            registry,
            channel,
            slack,
            engines,
            store,
            rotator,
            config,
            reset_flags,
            ticks,
            steps: tokio::sync::Mutex::new(JoinSet::new()),
            last_rotation: Mutex::new(Instant::now()),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn reset_flags(&self) -> &ResetFlags {
        &self.reset_flags
    }

    /// Steps still running from earlier ticks.
    pub async fn in_flight_steps(&self) -> usize {
        let mut steps = self.steps.lock().await;
        while steps.try_join_next().is_some() {}
        steps.len()
    }

    /// Run the tick loop. Spawn as a background task; never returns.
    pub async fn run(self: Arc<Self>) {
        let normal = Duration::from_secs(self.config.tick_interval_secs.max(1));
        let mut interval = tokio::time::interval(normal);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            tick_secs = self.config.tick_interval_secs,
            "session scheduler started"
        );

        loop {
            interval.tick().await;
            let report = self.tick().await;
            if report.emergency_reset {
                let faster =
                    Duration::from_secs(self.config.emergency_tick_interval_secs.max(1)).min(normal);
                warn!(?faster, "reinstalling tick interval after emergency reset");
                interval = tokio::time::interval(faster);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }
    }

    /// One tick: reap finished steps, apply reset flags, step every
    /// session, then run the overload and rotation bookkeeping.
    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = TickReport::default();

        let mut steps = self.steps.lock().await;
        while steps.try_join_next().is_some() {}

        report.rebuilt = self.apply_resets().await;

        for session in self.registry.snapshot().await {
            let lock = self.registry.step_lock(session.bot_id()).await;
            let Ok(guard) = lock.try_lock_owned() else {
                debug!(bot_id = %session.bot_id(), "previous step still running, skipping tick");
                report.skipped += 1;
                continue;
            };
            report.stepped += 1;
            steps.spawn(async move {
                let _guard = guard;
                if let Err(e) = session.step().await {
                    // Logged and contained: one bot's failure never
                    // aborts the other sessions' steps.
                    warn!(bot_id = %session.bot_id(), error = %e, "session step failed");
                }
            });
        }

        if self.config.overload_check_ticks > 0 && tick % self.config.overload_check_ticks == 0 {
            let in_flight = steps.len();
            debug!(tick, in_flight, "overload check");
            if in_flight > self.config.overload_high_water {
                error!(
                    in_flight,
                    high_water = self.config.overload_high_water,
                    "session pool overloaded, aborting every in-flight step"
                );
                steps.shutdown().await;
                // Aborted steps never deliver; drop the queued prompts
                // and tracked requests they leave behind.
                for session in self.registry.snapshot().await {
                    session.clear_in_flight();
                }
                report.emergency_reset = true;
            }
        }
        drop(steps);

        self.maybe_rotate_credentials().await;
        report
    }

    /// Rebuild the session of every bot flagged for reset. The new session
    /// gets fresh config from the store and the old session's adapters
    /// (attach is idempotent); the old instance is swapped out atomically
    /// and its engine state discarded.
    async fn apply_resets(&self) -> usize {
        let mut rebuilt = 0;
        for bot_id in self.reset_flags.drain() {
            let config = match self.store.get_bot(&bot_id) {
                Ok(Some(config)) => config,
                Ok(None) => {
                    warn!(%bot_id, "reset requested for bot with no stored config, removing session");
                    self.registry.remove(&bot_id).await;
                    self.channel.detach_bot(&bot_id);
                    if let Some(slack) = &self.slack {
                        slack.detach_bot(&bot_id);
                    }
                    continue;
                }
                Err(e) => {
                    warn!(%bot_id, error = %e, "failed to load config for reset, flag dropped");
                    continue;
                }
            };
            let session = build_session(
                &config,
                self.engines.as_ref(),
                &self.channel,
                self.slack.as_deref(),
            );
            self.registry.insert(Arc::new(session)).await;
            info!(%bot_id, "session rebuilt from reset flag");
            rebuilt += 1;
        }
        rebuilt
    }

    async fn maybe_rotate_credentials(&self) {
        let due = {
            let mut last = self.last_rotation.lock();
            if last.elapsed() < Duration::from_secs(self.config.credential_rotation_secs) {
                false
            } else {
                *last = Instant::now();
                true
            }
        };
        if !due {
            return;
        }
        match self.rotator.rotate().await {
            Ok(()) => info!("credential rotation completed"),
            Err(e) => warn!(error = %e, "credential rotation failed, retrying next interval"),
        }
    }
}
