//! CLI binary for plugin-reliability.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plugin_reliability::logging::{init_logging, LogConfig, LogRotation};
use plugin_reliability::persistence::load_snapshot;
use plugin_reliability::ConfigLoader;
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

/// Reliability engine tooling: configuration checks and snapshot inspection.
#[derive(Parser)]
#[command(name = "reliability-cli", version, about)]
struct Cli {
    /// Log level or EnvFilter directive.
    #[arg(long, env = "RELIABILITY_LOG", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Also write logs to rolling files in this directory.
    #[arg(long, env = "RELIABILITY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log file rotation: daily, hourly or never.
    #[arg(long, default_value = "daily")]
    log_rotation: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a TOML configuration file and print the effective settings.
    ValidateConfig {
        /// Path to the configuration file.
        path: PathBuf,
    },

    /// Print arm mean rewards and posterior means stored in a snapshot.
    Inspect {
        /// Path to the snapshot file.
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut log_config = LogConfig::console(&cli.log_level)
        .with_json(cli.json_logs)
        .with_rotation(LogRotation::parse(&cli.log_rotation));
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::ValidateConfig { path } => validate_config(path),
        Command::Inspect { snapshot } => inspect(snapshot).await,
    }
}

fn validate_config(path: PathBuf) -> Result<()> {
    let config = match ConfigLoader::new()
        .load_from_file(Some(path.clone()))
        .load_from_env()
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration {}: {}", path.display(), e);
            return Err(e).with_context(|| format!("{} is not a valid configuration", path.display()));
        }
    };

    info!("Configuration {} is valid", path.display());
    // 環境変数を反映した実効設定を TOML で出力
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn inspect(path: PathBuf) -> Result<()> {
    let snapshot = load_snapshot(&path)
        .await
        .with_context(|| format!("failed to inspect {}", path.display()))?;

    let feature_points: std::collections::BTreeMap<_, _> = snapshot
        .features
        .iter()
        .map(|(id, history)| (id.clone(), history.len()))
        .collect();

    let report = json!({
        "version": snapshot.version,
        "saved_at": snapshot.saved_at,
        "epsilon": snapshot.bandit.epsilon,
        "total_plays": snapshot.bandit.total_plays,
        "arm_means": snapshot.arm_means(),
        "posterior_means": snapshot.posterior_means(),
        "feature_points": feature_points,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
