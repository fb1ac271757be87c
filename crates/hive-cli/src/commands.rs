use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use hive_config::ConfigLoader;
use hive_engine::{EngineFactory, MockEngineFactory};
use hive_runtime::Runtime;

/// 🐝 Hive — Multi-bot session runtime with client tool callbacks
#[derive(Parser)]
#[command(name = "hive", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to hive.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime (scheduler + task engine + HTTP server)
    Serve {
        /// Don't start the HTTP server
        #[arg(long)]
        no_server: bool,
    },
    /// Show runtime status (queries a running server)
    Status,
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Initialize a new hive.toml in the current or home directory
    Init {
        /// Create in current directory instead of ~/.hive/
        #[arg(long)]
        local: bool,
    },
}

impl Cli {
    pub async fn run(self) -> hive_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config default
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };

        // Initialize tracing with appropriate format
        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Serve { no_server } => {
                Self::cmd_serve(config, no_server, config_loader).await
            }
            Commands::Status => Self::cmd_status(config).await,
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Init { local } => Self::cmd_init(local),
        }
    }

    async fn cmd_serve(
        config: hive_config::HiveConfig,
        no_server: bool,
        config_loader: ConfigLoader,
    ) -> hive_core::Result<()> {
        println!("🐝 Hive v{}", env!("CARGO_PKG_VERSION"));
        println!("   Engine: {}", config.runtime.engine);
        println!("   Store:  {}", config.store.db_path.display());
        println!();

        // Start config hot-reload watcher (kept alive for duration of runtime)
        let _watcher = match config_loader.watch() {
            Ok(w) => {
                println!("   Config hot-reload: enabled");
                Some(w)
            }
            Err(e) => {
                tracing::warn!(error = %e, "config hot-reload disabled");
                None
            }
        };

        let engines = Self::engine_factory(&config)?;
        let handle = Runtime::start(&config, engines).await?;

        if no_server {
            // Runtime loops run in the background; park this task.
            std::future::pending::<()>().await;
            return Ok(());
        }

        hive_server::start_server(config.server.clone(), handle).await
    }

    /// Resolve the configured engine identifier to a factory.
    fn engine_factory(
        config: &hive_config::HiveConfig,
    ) -> hive_core::Result<Arc<dyn EngineFactory>> {
        match config.runtime.engine.as_str() {
            "mock" => Ok(Arc::new(MockEngineFactory::new())),
            other => Err(hive_core::HiveError::Config(format!(
                "unknown engine '{other}' — supported: mock"
            ))),
        }
    }

    async fn cmd_status(config: hive_config::HiveConfig) -> hive_core::Result<()> {
        let listen = &config.server.listen;
        println!("Checking status at http://{}...", listen);

        let client = reqwest::Client::new();
        match client.get(format!("http://{}/status", listen)).send().await {
            Ok(resp) => {
                let data: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| hive_core::HiveError::Server(e.to_string()))?;
                println!("{}", serde_json::to_string_pretty(&data).unwrap_or_default());
            }
            Err(_) => {
                println!("❌ Hive is not running at {}", listen);
            }
        }
        Ok(())
    }

    fn cmd_config(config: hive_config::HiveConfig, json: bool) -> hive_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config)
                    .map_err(|e| hive_core::HiveError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_init(local: bool) -> hive_core::Result<()> {
        let dir = if local {
            std::env::current_dir()?
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".hive")
        };

        std::fs::create_dir_all(&dir)?;
        let config_path = dir.join("hive.toml");

        if config_path.exists() {
            println!("⚠️  {} already exists", config_path.display());
            return Ok(());
        }

        let minimal = r#"# 🐝 Hive Configuration

[runtime]
engine = "mock"

# [[runtime.seed_bots]]
# bot_id = "eve"
# bot_name = "Eve"
# instructions = "You are a helpful assistant."

[scheduler]
tick_interval_secs = 1

[tasks]
enabled = true
loop_interval_secs = 30

[store]
db_path = "hive.db"

[server]
listen = "127.0.0.1:3700"
# api_key = "your-secret-key"

[slack]
enabled = false
# bot_token = "xoxb-..."   # or env: SLACK_BOT_TOKEN

[logging]
level = "info"
format = "pretty"  # pretty | json | compact
"#;
        std::fs::write(&config_path, minimal)?;
        println!("✅ Created {}", config_path.display());
        println!("   Start the runtime with: hive serve");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_engine_factory_rejects_unknown() {
        let mut config = hive_config::HiveConfig::default();
        config.runtime.engine = "anthropic/claude-sonnet-4".into();
        assert!(Cli::engine_factory(&config).is_err());

        config.runtime.engine = "mock".into();
        assert!(Cli::engine_factory(&config).is_ok());
    }
}
