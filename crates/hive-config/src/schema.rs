use hive_core::BotConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `hive.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub runtime: RuntimeConfig,
    pub scheduler: SchedulerConfig,
    pub tasks: TasksConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub slack: SlackConfig,
    pub logging: LoggingConfig,
}

// ── Runtime ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Planning engine identifier, e.g. "mock" or "anthropic/claude-sonnet-4".
    pub engine: String,
    /// Bots to upsert into the store at startup. Sessions are built from the
    /// store, so these only seed a fresh database.
    pub seed_bots: Vec<BotConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: "mock".into(),
            seed_bots: vec![],
        }
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between ticks of the session driver. The driver is designed
    /// for a 1-2s cadence.
    pub tick_interval_secs: u64,
    /// Sample in-flight step count every this many ticks.
    pub overload_check_ticks: u64,
    /// In-flight step count above which the emergency reset fires.
    pub overload_high_water: usize,
    /// Tick interval installed after an emergency reset.
    pub emergency_tick_interval_secs: u64,
    /// Seconds between credential-rotation callbacks.
    pub credential_rotation_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            overload_check_ticks: 100,
            overload_high_water: 50,
            emergency_tick_interval_secs: 1,
            credential_rotation_secs: 21_600,
        }
    }
}

// ── Tasks ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Whether the unattended task engine runs at all.
    pub enabled: bool,
    /// Seconds between task engine iterations.
    pub loop_interval_secs: u64,
    /// Pending runs older than this are dropped with a warning.
    pub stale_after_secs: u64,
    /// Invalid responses tolerated before a task is deactivated.
    pub max_retries: u32,
    /// Tasks may not reschedule themselves closer than this.
    pub min_reschedule_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            loop_interval_secs: 30,
            stale_after_secs: 600,
            max_retries: 3,
            min_reschedule_secs: 300,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("hive.db"),
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Optional API key for the request surface.
    pub api_key: Option<String>,
    /// Enable CORS (for browser-based pollers).
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3700".into(),
            api_key: None,
            cors: false,
        }
    }
}

// ── Slack ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Whether any Slack delivery (bot adapters, task escalations) is wired.
    pub enabled: bool,
    /// Bot token. Can also be set via SLACK_BOT_TOKEN environment variable.
    /// Config file takes priority over environment variable.
    pub bot_token: Option<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Default for root ───────────────────────────────────────────

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            scheduler: SchedulerConfig::default(),
            tasks: TasksConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            slack: SlackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl HiveConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Engine ───
        if self.runtime.engine.is_empty() {
            warnings.push(ConfigWarning {
                field: "runtime.engine".into(),
                message: "engine is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to 'mock' or a provider/model identifier".into()),
            });
        }

        // ── Seed bots ───
        for bot in &self.runtime.seed_bots {
            if bot.bot_id.is_empty() {
                warnings.push(ConfigWarning {
                    field: "runtime.seed_bots".into(),
                    message: "seed bot with empty bot_id".into(),
                    severity: WarningSeverity::Error,
                    hint: Some("Every seed bot needs a unique bot_id".into()),
                });
            }
            if bot.slack_active && !self.slack.enabled {
                warnings.push(ConfigWarning {
                    field: format!("runtime.seed_bots.{}", bot.bot_id),
                    message: "bot wants Slack but [slack] is disabled".into(),
                    severity: WarningSeverity::Warning,
                    hint: Some("Enable [slack] or set slack_active = false".into()),
                });
            }
        }

        // ── Scheduler cadence ───
        if self.scheduler.tick_interval_secs == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.tick_interval_secs".into(),
                message: "tick interval is 0 — sessions would spin".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to 1 or 2".into()),
            });
        } else if self.scheduler.tick_interval_secs > 2 {
            warnings.push(ConfigWarning {
                field: "scheduler.tick_interval_secs".into(),
                message: format!(
                    "tick interval {}s is slow — responses lag behind polls",
                    self.scheduler.tick_interval_secs
                ),
                severity: WarningSeverity::Warning,
                hint: Some("The driver is designed for a 1-2s cadence".into()),
            });
        }

        if self.scheduler.overload_high_water == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.overload_high_water".into(),
                message: "high-water mark is 0 — every overload check would reset".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 50".into()),
            });
        }

        if self.scheduler.overload_check_ticks == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.overload_check_ticks".into(),
                message: "overload check every 0 ticks is invalid".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 100".into()),
            });
        }

        // ── Task engine ───
        if self.tasks.loop_interval_secs == 0 {
            warnings.push(ConfigWarning {
                field: "tasks.loop_interval_secs".into(),
                message: "task loop interval is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30".into()),
            });
        }

        if self.tasks.max_retries == 0 {
            warnings.push(ConfigWarning {
                field: "tasks.max_retries".into(),
                message: "max_retries is 0 — tasks deactivate on the first bad response".into(),
                severity: WarningSeverity::Warning,
                hint: Some("3 gives models a fair chance to correct themselves".into()),
            });
        }

        if self.tasks.min_reschedule_secs < 60 {
            warnings.push(ConfigWarning {
                field: "tasks.min_reschedule_secs".into(),
                message: format!(
                    "minimum reschedule {}s lets tasks run nearly back-to-back",
                    self.tasks.min_reschedule_secs
                ),
                severity: WarningSeverity::Warning,
                hint: Some("300 (5 minutes) keeps runaway tasks in check".into()),
            });
        }

        // ── Server listen address ───
        if self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '127.0.0.1:3700'".into()),
            });
        } else if self.server.listen.starts_with("0.0.0.0") {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "binding to 0.0.0.0 — server is accessible from all interfaces".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Use '127.0.0.1:3700' for local-only access, or set an api_key".into()),
            });
        }

        if self.server.api_key.is_none() && self.server.listen.starts_with("0.0.0.0") {
            warnings.push(ConfigWarning {
                field: "server.api_key".into(),
                message: "no API key set while server is network-accessible".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set server.api_key to protect your bots".into()),
            });
        }

        // ── Slack ───
        if self.slack.enabled && self.slack.bot_token.is_none() {
            warnings.push(ConfigWarning {
                field: "slack.bot_token".into(),
                message: "Slack is enabled but no bot token is set".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set slack.bot_token or the SLACK_BOT_TOKEN environment variable".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
