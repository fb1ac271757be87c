use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{info, warn};

use hive_core::{BotConfig, TaskRecord, TaskRunRecord, ToolDescriptor};

/// Persistent store backing the runtime.
///
/// Bot configs are stored as JSON blobs keyed by bot_id; tasks and task
/// history use columns because the task engine updates individual fields.
pub struct HiveStore {
    db: Arc<Mutex<Connection>>,
}

impl HiveStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> hive_core::Result<Self> {
        info!(?path, "opening store");

        let conn =
            Connection::open(path).map_err(|e| hive_core::HiveError::Store(e.to_string()))?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;

        // Create tables
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS bots (
                bot_id TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                task_name TEXT NOT NULL,
                instructions TEXT NOT NULL,
                reporting_instructions TEXT DEFAULT '',
                report_to_type TEXT DEFAULT '',
                report_to_id TEXT DEFAULT '',
                schedule TEXT DEFAULT '',
                next_check_ts TEXT NOT NULL,
                last_status TEXT DEFAULT '',
                learnings TEXT DEFAULT '',
                active INTEGER DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                work_done_summary TEXT NOT NULL,
                task_status TEXT NOT NULL,
                updated_task_learnings TEXT NOT NULL,
                report_message TEXT DEFAULT '',
                done_flag INTEGER NOT NULL,
                needs_help_flag INTEGER NOT NULL,
                task_clarity_comments TEXT DEFAULT '',
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS client_tools (
                scope TEXT NOT NULL,
                name TEXT NOT NULL,
                descriptor_json TEXT NOT NULL,
                timeout_secs INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (scope, name)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_bot ON tasks(bot_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_active ON tasks(active);
            CREATE INDEX IF NOT EXISTS idx_task_history_task ON task_history(task_id);
            ",
        )
        .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> hive_core::Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Get a reference to the raw database connection (for advanced queries).
    pub fn db(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.db.lock()
    }

    // ── Bots ───────────────────────────────────────────────────

    /// Persist a bot config (upsert by bot_id).
    pub fn upsert_bot(&self, config: &BotConfig) -> hive_core::Result<()> {
        let json = serde_json::to_string(config)
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        let db = self.db.lock();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO bots (bot_id, config_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(bot_id) DO UPDATE SET
                config_json = excluded.config_json,
                updated_at = excluded.updated_at",
            rusqlite::params![config.bot_id, json, now],
        )
        .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        Ok(())
    }

    /// Load one bot config.
    pub fn get_bot(&self, bot_id: &str) -> hive_core::Result<Option<BotConfig>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT config_json FROM bots WHERE bot_id = ?1")
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;

        let json: Option<String> = stmt
            .query_row(rusqlite::params![bot_id], |row| row.get(0))
            .ok();

        match json {
            Some(j) => {
                let config: BotConfig = serde_json::from_str(&j)
                    .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Load every bot config, ordered by bot_id.
    pub fn list_bots(&self) -> hive_core::Result<Vec<BotConfig>> {
        let rows: Vec<String> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare("SELECT config_json FROM bots ORDER BY bot_id")
                .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
            stmt.query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| hive_core::HiveError::Store(e.to_string()))?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut configs = Vec::with_capacity(rows.len());
        for json in rows {
            match serde_json::from_str::<BotConfig>(&json) {
                Ok(config) => configs.push(config),
                Err(e) => warn!(error = %e, "skipping unparseable bot config row"),
            }
        }
        Ok(configs)
    }

    /// Delete a bot config. Returns whether a row was removed.
    pub fn delete_bot(&self, bot_id: &str) -> hive_core::Result<bool> {
        let db = self.db.lock();
        let rows = db
            .execute(
                "DELETE FROM bots WHERE bot_id = ?1",
                rusqlite::params![bot_id],
            )
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        Ok(rows > 0)
    }

    // ── Tasks ──────────────────────────────────────────────────

    /// Persist a task (upsert by task_id).
    pub fn upsert_task(&self, task: &TaskRecord) -> hive_core::Result<()> {
        let db = self.db.lock();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO tasks (task_id, bot_id, task_name, instructions, reporting_instructions,
                                report_to_type, report_to_id, schedule, next_check_ts, last_status,
                                learnings, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
             ON CONFLICT(task_id) DO UPDATE SET
                bot_id = excluded.bot_id,
                task_name = excluded.task_name,
                instructions = excluded.instructions,
                reporting_instructions = excluded.reporting_instructions,
                report_to_type = excluded.report_to_type,
                report_to_id = excluded.report_to_id,
                schedule = excluded.schedule,
                next_check_ts = excluded.next_check_ts,
                last_status = excluded.last_status,
                learnings = excluded.learnings,
                active = excluded.active,
                updated_at = excluded.updated_at",
            rusqlite::params![
                task.task_id,
                task.bot_id,
                task.task_name,
                task.instructions,
                task.reporting_instructions,
                task.report_to_type,
                task.report_to_id,
                task.schedule,
                task.next_check_ts.to_rfc3339(),
                task.last_status,
                task.learnings,
                task.active as i32,
                now,
            ],
        )
        .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        Ok(())
    }

    /// Load one task.
    pub fn get_task(&self, task_id: &str) -> hive_core::Result<Option<TaskRecord>> {
        let mut tasks = self.query_tasks("WHERE task_id = ?1", rusqlite::params![task_id])?;
        Ok(tasks.pop())
    }

    /// Load every active task for a bot, soonest due first.
    pub fn list_active_tasks(&self, bot_id: &str) -> hive_core::Result<Vec<TaskRecord>> {
        self.query_tasks(
            "WHERE bot_id = ?1 AND active = 1 ORDER BY next_check_ts",
            rusqlite::params![bot_id],
        )
    }

    /// Load every task for a bot, active or not.
    pub fn list_tasks(&self, bot_id: &str) -> hive_core::Result<Vec<TaskRecord>> {
        self.query_tasks(
            "WHERE bot_id = ?1 ORDER BY next_check_ts",
            rusqlite::params![bot_id],
        )
    }

    fn query_tasks(
        &self,
        suffix: &str,
        params: impl rusqlite::Params,
    ) -> hive_core::Result<Vec<TaskRecord>> {
        let rows: Vec<TaskRow> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(&format!(
                    "SELECT task_id, bot_id, task_name, instructions, reporting_instructions,
                            report_to_type, report_to_id, schedule, next_check_ts, last_status,
                            learnings, active
                     FROM tasks {suffix}"
                ))
                .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
            stmt.query_map(params, |row| {
                Ok(TaskRow {
                    task_id: row.get(0)?,
                    bot_id: row.get(1)?,
                    task_name: row.get(2)?,
                    instructions: row.get(3)?,
                    reporting_instructions: row.get(4)?,
                    report_to_type: row.get(5)?,
                    report_to_id: row.get(6)?,
                    schedule: row.get(7)?,
                    next_check_ts: row.get(8)?,
                    last_status: row.get(9)?,
                    learnings: row.get(10)?,
                    active: row.get::<_, i32>(11)? != 0,
                })
            })
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect()
        };

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_ts(&row.next_check_ts) {
                Some(next_check_ts) => tasks.push(TaskRecord {
                    task_id: row.task_id,
                    bot_id: row.bot_id,
                    task_name: row.task_name,
                    instructions: row.instructions,
                    reporting_instructions: row.reporting_instructions,
                    report_to_type: row.report_to_type,
                    report_to_id: row.report_to_id,
                    schedule: row.schedule,
                    next_check_ts,
                    last_status: row.last_status,
                    learnings: row.learnings,
                    active: row.active,
                }),
                None => warn!(task_id = %row.task_id, "skipping task with unparseable next_check_ts"),
            }
        }
        Ok(tasks)
    }

    /// Apply the outcome of a completed run to a task.
    pub fn update_task_after_run(
        &self,
        task_id: &str,
        next_check_ts: DateTime<Utc>,
        last_status: &str,
        learnings: &str,
        active: bool,
    ) -> hive_core::Result<()> {
        let db = self.db.lock();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "UPDATE tasks SET
                next_check_ts = ?2,
                last_status = ?3,
                learnings = ?4,
                active = ?5,
                updated_at = ?6
             WHERE task_id = ?1",
            rusqlite::params![
                task_id,
                next_check_ts.to_rfc3339(),
                last_status,
                learnings,
                active as i32,
                now,
            ],
        )
        .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        Ok(())
    }

    // ── Task history ───────────────────────────────────────────

    /// Append a run record to task history.
    pub fn record_task_run(&self, run: &TaskRunRecord) -> hive_core::Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO task_history (task_id, work_done_summary, task_status,
                                       updated_task_learnings, report_message, done_flag,
                                       needs_help_flag, task_clarity_comments, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                run.task_id,
                run.work_done_summary,
                run.task_status,
                run.updated_task_learnings,
                run.report_message,
                run.done_flag as i32,
                run.needs_help_flag as i32,
                run.task_clarity_comments,
                run.recorded_at.to_rfc3339(),
            ],
        )
        .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        Ok(())
    }

    /// Read recent run records for a task, newest first.
    pub fn task_history(&self, task_id: &str, limit: usize) -> Vec<TaskRunRecord> {
        let db = self.db.lock();
        let mut stmt = match db.prepare(
            "SELECT task_id, work_done_summary, task_status, updated_task_learnings,
                    report_message, done_flag, needs_help_flag, task_clarity_comments, recorded_at
             FROM task_history WHERE task_id = ?1 ORDER BY id DESC LIMIT ?2",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(rusqlite::params![task_id, limit as i64], |row| {
            Ok(TaskRunRecord {
                task_id: row.get(0)?,
                work_done_summary: row.get(1)?,
                task_status: row.get(2)?,
                updated_task_learnings: row.get(3)?,
                report_message: row.get(4)?,
                done_flag: row.get::<_, i32>(5)? != 0,
                needs_help_flag: row.get::<_, i32>(6)? != 0,
                task_clarity_comments: row.get(7)?,
                recorded_at: row.get::<_, String>(8).map(|s| {
                    parse_ts(&s).unwrap_or_else(Utc::now)
                })?,
            })
        })
        .ok()
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    // ── Client tools ───────────────────────────────────────────

    /// Persist a client-tool registration (upsert by scope+name).
    pub fn upsert_client_tool(
        &self,
        scope: &str,
        descriptor: &ToolDescriptor,
        timeout_secs: u64,
    ) -> hive_core::Result<()> {
        let json = serde_json::to_string(descriptor)
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        let db = self.db.lock();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO client_tools (scope, name, descriptor_json, timeout_secs, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(scope, name) DO UPDATE SET
                descriptor_json = excluded.descriptor_json,
                timeout_secs = excluded.timeout_secs,
                updated_at = excluded.updated_at",
            rusqlite::params![scope, descriptor.name, json, timeout_secs as i64, now],
        )
        .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        Ok(())
    }

    /// Remove a client-tool registration. Returns whether a row was removed.
    pub fn delete_client_tool(&self, scope: &str, name: &str) -> hive_core::Result<bool> {
        let db = self.db.lock();
        let rows = db
            .execute(
                "DELETE FROM client_tools WHERE scope = ?1 AND name = ?2",
                rusqlite::params![scope, name],
            )
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
        Ok(rows > 0)
    }

    /// Load every client-tool registration as (scope, descriptor, timeout).
    pub fn list_client_tools(&self) -> hive_core::Result<Vec<(String, ToolDescriptor, u64)>> {
        let rows: Vec<(String, String, i64)> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare("SELECT scope, descriptor_json, timeout_secs FROM client_tools ORDER BY scope, name")
                .map_err(|e| hive_core::HiveError::Store(e.to_string()))?;
            stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(|e| hive_core::HiveError::Store(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect()
        };

        let mut tools = Vec::with_capacity(rows.len());
        for (scope, json, timeout) in rows {
            match serde_json::from_str::<ToolDescriptor>(&json) {
                Ok(descriptor) => tools.push((scope, descriptor, timeout.max(0) as u64)),
                Err(e) => warn!(error = %e, "skipping unparseable client tool row"),
            }
        }
        Ok(tools)
    }
}

/// A raw task row loaded from SQLite, timestamp still unparsed.
struct TaskRow {
    task_id: String,
    bot_id: String,
    task_name: String,
    instructions: String,
    reporting_instructions: String,
    report_to_type: String,
    report_to_id: String,
    schedule: String,
    next_check_ts: String,
    last_status: String,
    learnings: String,
    active: bool,
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
