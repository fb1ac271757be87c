#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use hive_core::{BotConfig, TaskRecord, TaskRunRecord, ToolDescriptor};
    use hive_store::HiveStore;

    fn make_task(task_id: &str, bot_id: &str, active: bool) -> TaskRecord {
        TaskRecord {
            task_id: task_id.into(),
            bot_id: bot_id.into(),
            task_name: format!("task {task_id}"),
            instructions: "check the queue".into(),
            reporting_instructions: "post a summary".into(),
            report_to_type: "slack_user_id".into(),
            report_to_id: "U123".into(),
            schedule: "every morning".into(),
            next_check_ts: Utc::now() - Duration::minutes(5),
            last_status: String::new(),
            learnings: String::new(),
            active,
        }
    }

    // ── Bot config tests ───────────────────────────────────────

    #[test]
    fn test_bot_upsert_and_get() {
        let store = HiveStore::open_in_memory().unwrap();
        let mut config = BotConfig::minimal("eve", "Eve");
        config.instructions = "You are Eve.".into();
        store.upsert_bot(&config).unwrap();

        let loaded = store.get_bot("eve").unwrap().unwrap();
        assert_eq!(loaded.bot_name, "Eve");
        assert_eq!(loaded.instructions, "You are Eve.");
        assert!(store.get_bot("nobody").unwrap().is_none());
    }

    #[test]
    fn test_bot_upsert_replaces() {
        let store = HiveStore::open_in_memory().unwrap();
        let mut config = BotConfig::minimal("eve", "Eve");
        store.upsert_bot(&config).unwrap();

        config.instructions = "Updated instructions.".into();
        config.slack_active = true;
        store.upsert_bot(&config).unwrap();

        let loaded = store.get_bot("eve").unwrap().unwrap();
        assert_eq!(loaded.instructions, "Updated instructions.");
        assert!(loaded.slack_active);
        assert_eq!(store.list_bots().unwrap().len(), 1);
    }

    #[test]
    fn test_list_bots_sorted() {
        let store = HiveStore::open_in_memory().unwrap();
        store.upsert_bot(&BotConfig::minimal("zoe", "Zoe")).unwrap();
        store.upsert_bot(&BotConfig::minimal("adam", "Adam")).unwrap();

        let bots = store.list_bots().unwrap();
        assert_eq!(bots.len(), 2);
        assert_eq!(bots[0].bot_id, "adam");
        assert_eq!(bots[1].bot_id, "zoe");
    }

    #[test]
    fn test_delete_bot() {
        let store = HiveStore::open_in_memory().unwrap();
        store.upsert_bot(&BotConfig::minimal("eve", "Eve")).unwrap();
        assert!(store.delete_bot("eve").unwrap());
        assert!(!store.delete_bot("eve").unwrap());
        assert!(store.get_bot("eve").unwrap().is_none());
    }

    // ── Task tests ─────────────────────────────────────────────

    #[test]
    fn test_task_upsert_and_roundtrip() {
        let store = HiveStore::open_in_memory().unwrap();
        let task = make_task("t1", "eve", true);
        store.upsert_task(&task).unwrap();

        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded.bot_id, "eve");
        assert_eq!(loaded.instructions, "check the queue");
        assert_eq!(loaded.report_to_id, "U123");
        assert!(loaded.active);
        // RFC3339 roundtrip keeps sub-minute precision.
        assert!((loaded.next_check_ts - task.next_check_ts).num_seconds().abs() < 1);
    }

    #[test]
    fn test_list_active_tasks_filters_and_orders() {
        let store = HiveStore::open_in_memory().unwrap();
        let mut soon = make_task("soon", "eve", true);
        soon.next_check_ts = Utc::now() + Duration::minutes(1);
        let mut later = make_task("later", "eve", true);
        later.next_check_ts = Utc::now() + Duration::minutes(30);
        let inactive = make_task("off", "eve", false);
        let other_bot = make_task("other", "zoe", true);

        for t in [&soon, &later, &inactive, &other_bot] {
            store.upsert_task(t).unwrap();
        }

        let tasks = store.list_active_tasks("eve").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_id, "soon");
        assert_eq!(tasks[1].task_id, "later");

        assert_eq!(store.list_tasks("eve").unwrap().len(), 3);
    }

    #[test]
    fn test_update_task_after_run() {
        let store = HiveStore::open_in_memory().unwrap();
        store.upsert_task(&make_task("t1", "eve", true)).unwrap();

        let next = Utc::now() + Duration::hours(1);
        store
            .update_task_after_run("t1", next, "All clear", "queue empties overnight", true)
            .unwrap();

        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded.last_status, "All clear");
        assert_eq!(loaded.learnings, "queue empties overnight");
        assert!(loaded.active);
        assert!((loaded.next_check_ts - next).num_seconds().abs() < 1);
    }

    #[test]
    fn test_deactivate_task_via_update() {
        let store = HiveStore::open_in_memory().unwrap();
        store.upsert_task(&make_task("t1", "eve", true)).unwrap();
        store
            .update_task_after_run("t1", Utc::now(), "done for good", "", false)
            .unwrap();

        let loaded = store.get_task("t1").unwrap().unwrap();
        assert!(!loaded.active);
        assert!(store.list_active_tasks("eve").unwrap().is_empty());
    }

    // ── Task history tests ─────────────────────────────────────

    #[test]
    fn test_task_history_append_and_read() {
        let store = HiveStore::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .record_task_run(&TaskRunRecord {
                    task_id: "t1".into(),
                    work_done_summary: format!("run {i}"),
                    task_status: "ok".into(),
                    updated_task_learnings: String::new(),
                    report_message: String::new(),
                    done_flag: false,
                    needs_help_flag: false,
                    task_clarity_comments: String::new(),
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }

        let history = store.task_history("t1", 2);
        assert_eq!(history.len(), 2);
        // Newest first.
        assert_eq!(history[0].work_done_summary, "run 2");
        assert_eq!(history[1].work_done_summary, "run 1");
        assert!(store.task_history("unknown", 10).is_empty());
    }

    // ── Client tool tests ──────────────────────────────────────

    #[test]
    fn test_client_tool_upsert_list_delete() {
        let store = HiveStore::open_in_memory().unwrap();
        let desc = ToolDescriptor::new("get_time", "Returns the current time");
        store.upsert_client_tool("eve", &desc, 30).unwrap();
        store.upsert_client_tool("_ALL_BOTS_", &desc, 60).unwrap();

        let tools = store.list_client_tools().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].0, "_ALL_BOTS_");
        assert_eq!(tools[0].2, 60);
        assert_eq!(tools[1].0, "eve");

        // Upsert replaces the timeout.
        store.upsert_client_tool("eve", &desc, 90).unwrap();
        let tools = store.list_client_tools().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1].2, 90);

        assert!(store.delete_client_tool("eve", "get_time").unwrap());
        assert!(!store.delete_client_tool("eve", "get_time").unwrap());
        assert_eq!(store.list_client_tools().unwrap().len(), 1);
    }

    // ── File-backed store ──────────────────────────────────────

    #[test]
    fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.db");

        {
            let store = HiveStore::open(&path).unwrap();
            store.upsert_bot(&BotConfig::minimal("eve", "Eve")).unwrap();
            store.upsert_task(&make_task("t1", "eve", true)).unwrap();
        }

        let store = HiveStore::open(&path).unwrap();
        assert!(store.get_bot("eve").unwrap().is_some());
        assert_eq!(store.list_active_tasks("eve").unwrap().len(), 1);
    }
}
