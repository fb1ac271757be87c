use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::BotId;

/// Timestamp format tasks must use for `next_run_time`.
pub const TASK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Persisted definition of an unattended job a bot runs on a schedule.
///
/// Mutated only by the task engine after a run completes, succeeds with a
/// new `next_run_time`, or exhausts its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub bot_id: BotId,
    pub task_name: String,
    /// What the bot should do each run.
    pub instructions: String,
    /// How and where results should be reported.
    #[serde(default)]
    pub reporting_instructions: String,
    /// Escalation target kind, e.g. "slack_user_id".
    #[serde(default)]
    pub report_to_type: String,
    #[serde(default)]
    pub report_to_id: String,
    /// Free-text description of the trigger cadence, echoed into prompts.
    #[serde(default)]
    pub schedule: String,
    /// Next time the task is due.
    pub next_check_ts: DateTime<Utc>,
    #[serde(default)]
    pub last_status: String,
    /// Rolling notes the bot keeps for itself between runs.
    #[serde(default)]
    pub learnings: String,
    pub active: bool,
}

impl TaskRecord {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_check_ts <= now
    }
}

/// One completed (or terminally failed) run, appended to task history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunRecord {
    pub task_id: String,
    pub work_done_summary: String,
    pub task_status: String,
    pub updated_task_learnings: String,
    #[serde(default)]
    pub report_message: String,
    pub done_flag: bool,
    pub needs_help_flag: bool,
    #[serde(default)]
    pub task_clarity_comments: String,
    pub recorded_at: DateTime<Utc>,
}
