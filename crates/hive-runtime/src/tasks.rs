use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use hive_channels::{Notifier, RequestChannel};
use hive_config::schema::TasksConfig;
use hive_core::{
    BotId, HiveError, ReportTarget, Request, Result, TASK_TIME_FORMAT, TaskRecord, TaskRunRecord,
    extract_json,
};
use hive_store::HiveStore;

use crate::session::SessionRegistry;

/// Keys every task response must carry.
const REQUIRED_KEYS: [&str; 6] = [
    "work_done_summary",
    "task_status",
    "updated_task_learnings",
    "done_flag",
    "needs_help_flag",
    "next_run_time",
];

/// The structured outcome a bot reports at the end of a task run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResponse {
    pub work_done_summary: String,
    pub task_status: String,
    pub updated_task_learnings: String,
    pub report_message: String,
    pub task_clarity_comments: String,
    pub done_flag: bool,
    pub needs_help_flag: bool,
    pub next_run_time: Option<DateTime<Utc>>,
}

/// Parse and validate a task response out of raw chat text.
///
/// The JSON may be bare, fenced, or preceded by prose. Every key in
/// [`REQUIRED_KEYS`] must be present, both flags must be booleans, and a
/// task that is not done must name a parseable `next_run_time`. A done
/// task may leave `next_run_time` null or unparseable.
pub fn validate_task_response(text: &str) -> Result<TaskResponse> {
    let value = extract_json(text)
        .map_err(|e| HiveError::ResponseValidation(format!("response is not valid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| HiveError::ResponseValidation("response JSON is not an object".into()))?;

    for key in REQUIRED_KEYS {
        if !obj.contains_key(key) {
            return Err(HiveError::ResponseValidation(format!(
                "missing required key: {key}"
            )));
        }
    }

    let flag = |key: &str| -> Result<bool> {
        obj[key]
            .as_bool()
            .ok_or_else(|| HiveError::ResponseValidation(format!("{key} is not a boolean")))
    };
    let done_flag = flag("done_flag")?;
    let needs_help_flag = flag("needs_help_flag")?;

    let next_run_time = match &obj["next_run_time"] {
        Value::String(s) => match parse_task_time(s) {
            Some(ts) => Some(ts),
            None if done_flag => None,
            None => {
                return Err(HiveError::ResponseValidation(format!(
                    "next_run_time '{s}' does not parse as {TASK_TIME_FORMAT}"
                )));
            }
        },
        _ if done_flag => None,
        other => {
            return Err(HiveError::ResponseValidation(format!(
                "next_run_time must be a \"{TASK_TIME_FORMAT}\" string, got: {other}"
            )));
        }
    };

    let text_field = |key: &str| obj[key].as_str().unwrap_or_default().to_string();
    let optional_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(TaskResponse {
        work_done_summary: text_field("work_done_summary"),
        task_status: text_field("task_status"),
        updated_task_learnings: text_field("updated_task_learnings"),
        report_message: optional_field("report_message"),
        task_clarity_comments: optional_field("task_clarity_comments"),
        done_flag,
        needs_help_flag,
        next_run_time,
    })
}

/// Parse the task timestamp format, interpreted as UTC.
pub fn parse_task_time(s: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s.trim(), TASK_TIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Keep a requested reschedule at least `min` in the future, so a model
/// answering "run again right away" cannot re-trigger on every loop.
pub fn clamp_reschedule(
    requested: DateTime<Utc>,
    now: DateTime<Utc>,
    min: chrono::Duration,
) -> DateTime<Utc> {
    let floor = now + min;
    if requested < floor { floor } else { requested }
}

/// The deterministic prompt that wakes a bot up for one task run.
pub fn task_prompt(task: &TaskRecord, now: DateTime<Utc>) -> String {
    format!(
        "You are being woken up for a scheduled task. No human is on this thread; \
work autonomously and report back in the exact format below.\n\
\n\
Task name: {name}\n\
Task instructions: {instructions}\n\
Reporting instructions: {reporting}\n\
Report to: {report_to_type} {report_to_id}\n\
Trigger schedule: {schedule}\n\
Last run status: {last_status}\n\
Learnings from previous runs: {learnings}\n\
Current server time (UTC): {now}\n\
\n\
When the run is finished, respond with ONLY a JSON object with these keys:\n\
  work_done_summary: string, what you did this run\n\
  task_status: string, one-line status for the task record\n\
  updated_task_learnings: string, notes for your future runs\n\
  done_flag: boolean, true when the task never needs to run again\n\
  needs_help_flag: boolean, true when a human must step in\n\
  next_run_time: \"{time_format}\" UTC timestamp for the next run (required unless done_flag is true)\n\
  report_message: optional string to deliver to the reporting target\n\
  task_clarity_comments: optional string describing anything ambiguous",
        name = task.task_name,
        instructions = task.instructions,
        reporting = task.reporting_instructions,
        report_to_type = task.report_to_type,
        report_to_id = task.report_to_id,
        schedule = task.schedule,
        last_status = task.last_status,
        learnings = task.learnings,
        now = now.format(TASK_TIME_FORMAT),
        time_format = TASK_TIME_FORMAT,
    )
}

/// The corrective prompt sent back on the same thread after an invalid
/// response.
pub fn corrective_prompt(error: &str) -> String {
    format!("Your response generated an error, please try to fix it. Error: {error}")
}

/// In-memory marker that a task prompt was submitted and a response is
/// awaited. At most one exists per task_id.
#[derive(Debug, Clone)]
pub struct PendingTaskRun {
    pub bot_id: BotId,
    pub task_id: String,
    pub request: Request,
    pub submitted_at: DateTime<Utc>,
}

/// Pending runs and retry counters, mutated only under one lock so the
/// due check and the insert cannot interleave.
#[derive(Default)]
struct TaskState {
    pending: HashMap<String, PendingTaskRun>,
    retries: HashMap<String, u32>,
}

/// The unattended task loop: a second caller driving sessions through the
/// request channel with nobody polling on the other end.
///
/// Each iteration sweeps stale runs, submits every due task that is not
/// already pending, and reconciles completed responses against the store.
/// Invalid responses are retried on the same thread up to
/// `max_retries` times; the next failure deactivates the task for good.
pub struct TaskEngine {
    registry: SessionRegistry,
    channel: Arc<RequestChannel>,
    store: Arc<HiveStore>,
    notifier: Arc<dyn Notifier>,
    config: TasksConfig,
    state: tokio::sync::Mutex<TaskState>,
}

impl TaskEngine {
    pub fn new(
        registry: SessionRegistry,
        channel: Arc<RequestChannel>,
        store: Arc<HiveStore>,
        notifier: Arc<dyn Notifier>,
        config: TasksConfig,
    ) -> Self {
        Self {
            registry,
            channel,
            store,
            notifier,
            config,
            state: tokio::sync::Mutex::new(TaskState::default()),
        }
    }

    /// Task ids with an outstanding run, sorted.
    pub async fn pending_task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().await.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run the task loop. Spawn as a background task; never returns.
    pub async fn run(self: Arc<Self>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.loop_interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            loop_secs = self.config.loop_interval_secs,
            "task engine started"
        );
        loop {
            interval.tick().await;
            self.run_iteration().await;
        }
    }

    /// One loop iteration: sweep, submit, reconcile.
    pub async fn run_iteration(&self) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        self.sweep_stale(&mut state, now);
        self.submit_due(&mut state, now).await;
        self.reconcile(&mut state).await;
    }

    /// Drop pending runs older than the staleness bound. The underlying
    /// request is not cancelled; its engine work finishes unobserved, and
    /// the task will be submitted fresh once it is due again.
    fn sweep_stale(&self, state: &mut TaskState, now: DateTime<Utc>) {
        let stale_after = chrono::Duration::seconds(self.config.stale_after_secs as i64);
        state.pending.retain(|task_id, run| {
            let age = now - run.submitted_at;
            if age <= stale_after {
                return true;
            }
            let err = HiveError::StaleRun {
                task_id: task_id.clone(),
                age_secs: age.num_seconds(),
            };
            warn!(bot_id = %run.bot_id, error = %err, "dropping stale task run");
            false
        });
    }

    /// Submit every due task that has no outstanding run. The pending map
    /// is consulted and updated under the same lock, so one iteration can
    /// never double-submit a task.
    async fn submit_due(&self, state: &mut TaskState, now: DateTime<Utc>) {
        for bot_id in self.registry.bot_ids().await {
            let tasks = match self.store.list_active_tasks(&bot_id) {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(%bot_id, error = %e, "failed to list tasks");
                    continue;
                }
            };
            for task in tasks {
                if !task.is_due(now) || state.pending.contains_key(&task.task_id) {
                    continue;
                }
                let prompt = task_prompt(&task, now);
                match self.channel.submit(&bot_id, "", &prompt) {
                    Ok(request) => {
                        info!(task_id = %task.task_id, %bot_id, request_id = %request.request_id, "task run submitted");
                        state.pending.insert(
                            task.task_id.clone(),
                            PendingTaskRun {
                                bot_id: bot_id.clone(),
                                task_id: task.task_id,
                                request,
                                submitted_at: now,
                            },
                        );
                    }
                    Err(e) => warn!(task_id = %task.task_id, %bot_id, error = %e, "task submit failed"),
                }
            }
        }
    }

    /// Poll every pending run and process completed responses.
    async fn reconcile(&self, state: &mut TaskState) {
        let runs: Vec<PendingTaskRun> = state.pending.values().cloned().collect();
        for run in runs {
            let reply = match self.channel.poll(&run.request).await {
                Ok(Some(reply)) if reply.complete => reply,
                Ok(_) => continue,
                Err(e) => {
                    warn!(task_id = %run.task_id, error = %e, "poll failed, dropping pending run");
                    state.pending.remove(&run.task_id);
                    continue;
                }
            };
            match validate_task_response(&reply.text) {
                Ok(response) => self.complete_run(state, &run, response, &reply.text).await,
                Err(e) => self.retry_run(state, &run, &e.to_string()).await,
            }
        }
    }

    /// Persist a validated run and clear its bookkeeping. A run that asks
    /// for help is forced done and escalated to its reporting target.
    async fn complete_run(
        &self,
        state: &mut TaskState,
        run: &PendingTaskRun,
        mut response: TaskResponse,
        transcript: &str,
    ) {
        let now = Utc::now();
        let task = match self.store.get_task(&run.task_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(task_id = %run.task_id, "completed run for a task no longer in the store");
                state.pending.remove(&run.task_id);
                state.retries.remove(&run.task_id);
                return;
            }
            Err(e) => {
                warn!(task_id = %run.task_id, error = %e, "failed to load task, keeping run pending");
                return;
            }
        };

        if response.needs_help_flag {
            response.done_flag = true;
            self.escalate(&task, &response, transcript);
        }

        let min = chrono::Duration::seconds(self.config.min_reschedule_secs as i64);
        let next_check_ts = response
            .next_run_time
            .map(|requested| clamp_reschedule(requested, now, min))
            .unwrap_or(now);

        let record = TaskRunRecord {
            task_id: run.task_id.clone(),
            work_done_summary: response.work_done_summary.clone(),
            task_status: response.task_status.clone(),
            updated_task_learnings: response.updated_task_learnings.clone(),
            report_message: response.report_message.clone(),
            done_flag: response.done_flag,
            needs_help_flag: response.needs_help_flag,
            task_clarity_comments: response.task_clarity_comments.clone(),
            recorded_at: now,
        };
        if let Err(e) = self.store.record_task_run(&record) {
            warn!(task_id = %run.task_id, error = %e, "failed to append task history");
        }
        if let Err(e) = self.store.update_task_after_run(
            &run.task_id,
            next_check_ts,
            &response.task_status,
            &response.updated_task_learnings,
            !response.done_flag,
        ) {
            warn!(task_id = %run.task_id, error = %e, "failed to persist task record, keeping run pending");
            return;
        }

        info!(
            task_id = %run.task_id,
            done = response.done_flag,
            needs_help = response.needs_help_flag,
            next_check = %next_check_ts,
            "task run completed"
        );
        state.pending.remove(&run.task_id);
        state.retries.remove(&run.task_id);
    }

    /// Resend a corrective prompt on the run's thread, or deactivate the
    /// task once the retries are spent.
    async fn retry_run(&self, state: &mut TaskState, run: &PendingTaskRun, error: &str) {
        let attempts = {
            let counter = state.retries.entry(run.task_id.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if attempts > self.config.max_retries {
            let status = format!(
                "Task failed to respond with a proper JSON after {} tries.",
                self.config.max_retries
            );
            warn!(task_id = %run.task_id, attempts, "retries exhausted, deactivating task");
            let learnings = self
                .store
                .get_task(&run.task_id)
                .ok()
                .flatten()
                .map(|task| task.learnings)
                .unwrap_or_default();
            let record = TaskRunRecord {
                task_id: run.task_id.clone(),
                work_done_summary: String::new(),
                task_status: status.clone(),
                updated_task_learnings: learnings.clone(),
                report_message: String::new(),
                done_flag: true,
                needs_help_flag: false,
                task_clarity_comments: format!("Last validation error: {error}"),
                recorded_at: Utc::now(),
            };
            if let Err(e) = self.store.record_task_run(&record) {
                warn!(task_id = %run.task_id, error = %e, "failed to append terminal task history");
            }
            if let Err(e) = self.store.update_task_after_run(
                &run.task_id,
                Utc::now(),
                &status,
                &learnings,
                false,
            ) {
                warn!(task_id = %run.task_id, error = %e, "failed to deactivate task");
            }
            state.pending.remove(&run.task_id);
            state.retries.remove(&run.task_id);
            return;
        }

        debug!(task_id = %run.task_id, attempts, error, "invalid task response, resending corrective prompt");
        match self
            .channel
            .submit(&run.bot_id, &run.request.thread_id, &corrective_prompt(error))
        {
            Ok(request) => {
                state.pending.insert(
                    run.task_id.clone(),
                    PendingTaskRun {
                        bot_id: run.bot_id.clone(),
                        task_id: run.task_id.clone(),
                        request,
                        submitted_at: Utc::now(),
                    },
                );
            }
            Err(e) => {
                warn!(task_id = %run.task_id, error = %e, "corrective submit failed, dropping pending run");
                state.pending.remove(&run.task_id);
            }
        }
    }

    /// Notify the task's reporting target that a human must step in.
    /// Delivery runs detached; failures are logged, never retried here.
    fn escalate(&self, task: &TaskRecord, response: &TaskResponse, transcript: &str) {
        let target = if !task.report_to_id.is_empty() {
            ReportTarget {
                target_type: task.report_to_type.clone(),
                target_id: task.report_to_id.clone(),
            }
        } else {
            match self.store.get_bot(&task.bot_id).ok().flatten().and_then(|b| b.report_to) {
                Some(target) => target,
                None => {
                    warn!(task_id = %task.task_id, "task needs help but has no reporting target");
                    return;
                }
            }
        };
        let detail = if !response.task_clarity_comments.is_empty() {
            response.task_clarity_comments.clone()
        } else if !response.report_message.is_empty() {
            response.report_message.clone()
        } else {
            response.task_status.clone()
        };
        let text = format!(
            "Task \"{name}\" needs human help and has been marked done.\n\
Reason: {detail}\n\
Task instructions: {instructions}\n\
Full response:\n{transcript}",
            name = task.task_name,
            detail = detail,
            instructions = task.instructions,
            transcript = transcript,
        );
        let notifier = Arc::clone(&self.notifier);
        let task_id = task.task_id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&target, &text).await {
                warn!(%task_id, error = %e, "task escalation failed");
            }
        });
    }
}
