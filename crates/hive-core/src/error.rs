use thiserror::Error;

/// Unified error type for the entire Hive runtime.
#[derive(Error, Debug)]
pub enum HiveError {
    // ── Session errors ─────────────────────────────────────────
    #[error("unknown bot: {0}")]
    UnknownBot(String),

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not registered: {0}")]
    ToolResolution(String),

    #[error("tool handler failed: {tool}: {reason}")]
    HandlerExecution { tool: String, reason: String },

    #[error("tool handler timed out: {tool} after {timeout_secs}s")]
    HandlerTimeout { tool: String, timeout_secs: u64 },

    // ── Protocol errors ────────────────────────────────────────
    #[error("malformed action message: {0}")]
    Protocol(String),

    // ── Task errors ────────────────────────────────────────────
    #[error("task response invalid: {0}")]
    ResponseValidation(String),

    #[error("stale task run: task {task_id} pending for {age_secs}s")]
    StaleRun { task_id: String, age_secs: i64 },

    // ── Engine errors ──────────────────────────────────────────
    #[error("engine error: {0}")]
    Engine(String),

    // ── Channel errors ─────────────────────────────────────────
    #[error("channel error: {channel}: {reason}")]
    Channel { channel: String, reason: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    // ── Server errors ──────────────────────────────────────────
    #[error("server error: {0}")]
    Server(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HiveError>;
