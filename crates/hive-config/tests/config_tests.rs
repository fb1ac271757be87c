#[cfg(test)]
mod tests {
    use hive_config::ConfigLoader;
    use hive_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_hive_config_defaults() {
        let config = HiveConfig::default();
        assert_eq!(config.runtime.engine, "mock");
        assert!(config.runtime.seed_bots.is_empty());
        assert_eq!(config.scheduler.tick_interval_secs, 1);
        assert_eq!(config.tasks.loop_interval_secs, 30);
        assert_eq!(config.store.db_path.to_str().unwrap(), "hive.db");
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.overload_check_ticks, 100);
        assert_eq!(config.overload_high_water, 50);
        assert_eq!(config.emergency_tick_interval_secs, 1);
        assert_eq!(config.credential_rotation_secs, 21_600);
    }

    #[test]
    fn test_tasks_config_defaults() {
        let config = TasksConfig::default();
        assert!(config.enabled);
        assert_eq!(config.stale_after_secs, 600);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.min_reschedule_secs, 300);
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen, "127.0.0.1:3700");
        assert!(!config.cors);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    // ── TOML roundtrip tests ───────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = HiveConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: HiveConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.runtime.engine, config.runtime.engine);
        assert_eq!(
            restored.scheduler.tick_interval_secs,
            config.scheduler.tick_interval_secs
        );
        assert_eq!(restored.server.listen, config.server.listen);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[scheduler]
tick_interval_secs = 2

[tasks]
enabled = false
"#;
        let config: HiveConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 2);
        assert!(!config.tasks.enabled);
        // Defaults should fill in
        assert_eq!(config.scheduler.overload_high_water, 50);
        assert_eq!(config.server.listen, "127.0.0.1:3700");
        assert_eq!(config.runtime.engine, "mock");
    }

    #[test]
    fn test_seed_bots_deserialize() {
        let toml_str = r#"
[[runtime.seed_bots]]
bot_id = "eve"
bot_name = "Eve"
instructions = "You are Eve."
available_tools = ["get_time"]
"#;
        let config: HiveConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runtime.seed_bots.len(), 1);
        let bot = &config.runtime.seed_bots[0];
        assert_eq!(bot.bot_id, "eve");
        assert!(bot.udf_active);
        assert!(!bot.slack_active);
        assert_eq!(bot.available_tools, vec!["get_time".to_string()]);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_rejects_zero_tick() {
        let mut config = HiveConfig::default();
        config.scheduler.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warns_on_slow_tick() {
        let mut config = HiveConfig::default();
        config.scheduler.tick_interval_secs = 10;
        let warnings = config.validate().unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| w.field == "scheduler.tick_interval_secs")
        );
    }

    #[test]
    fn test_validate_warns_on_slack_without_token() {
        let mut config = HiveConfig::default();
        config.slack.enabled = true;
        config.slack.bot_token = None;
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "slack.bot_token"));
    }

    #[test]
    fn test_validate_default_config_is_clean() {
        let config = HiveConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hive.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[runtime]
engine = "mock"

[scheduler]
tick_interval_secs = 2
overload_high_water = 25

[server]
listen = "127.0.0.1:9900"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.scheduler.tick_interval_secs, 2);
        assert_eq!(config.scheduler.overload_high_water, 25);
        assert_eq!(config.server.listen, "127.0.0.1:9900");
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("hive.toml");

        std::fs::write(
            &config_path,
            r#"
[tasks]
loop_interval_secs = 30
"#,
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().tasks.loop_interval_secs, 30);

        std::fs::write(
            &config_path,
            r#"
[tasks]
loop_interval_secs = 60
"#,
        )
        .unwrap();

        loader.reload().unwrap();
        assert_eq!(loader.get().tasks.loop_interval_secs, 60);
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = HiveConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: HiveConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.runtime.engine, config.runtime.engine);
    }
}
