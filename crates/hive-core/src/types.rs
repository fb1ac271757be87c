use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a bot, chosen at deploy time (e.g. "eve").
pub type BotId = String;

/// Unique identifier for one in-flight request.
pub type RequestId = Uuid;

/// Caller-facing conversation thread identifier. Opaque to the runtime;
/// each session maps it to an internal engine thread.
pub type ThreadId = String;

/// Internal engine-side thread identifier.
pub type EngineThreadId = Uuid;

/// Reserved scope name that applies a tool registration to every bot.
pub const ALL_BOTS: &str = "_ALL_BOTS_";

/// Static configuration for one bot, loaded from the store at session
/// creation and replaced wholesale on deploy or reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_id: BotId,
    pub bot_name: String,
    /// System instructions handed to the planning engine.
    pub instructions: String,
    /// Names of tools this bot may advertise to its engine.
    #[serde(default)]
    pub available_tools: Vec<String>,
    /// Whether the request/UDF surface is enabled for this bot.
    #[serde(default = "default_true")]
    pub udf_active: bool,
    /// Whether a Slack presence is attached to this bot.
    #[serde(default)]
    pub slack_active: bool,
    #[serde(default)]
    pub slack_channel_id: Option<String>,
    /// Default escalation target for unattended tasks that do not name one.
    #[serde(default)]
    pub report_to: Option<ReportTarget>,
}

fn default_true() -> bool {
    true
}

/// Where a task reports results or asks a human for help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTarget {
    /// Target kind, e.g. "slack_user_id" or "email".
    pub target_type: String,
    pub target_id: String,
}

impl BotConfig {
    /// Minimal config for a bot with only the request surface enabled.
    pub fn minimal(bot_id: impl Into<BotId>, bot_name: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            bot_name: bot_name.into(),
            instructions: String::new(),
            available_tools: vec![],
            udf_active: true,
            slack_active: false,
            slack_channel_id: None,
            report_to: None,
        }
    }
}
