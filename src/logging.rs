use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// ログファイル名のプレフィックス
pub const LOG_FILE_PREFIX: &str = "plugin-reliability.log";

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error) または EnvFilter 構文
    pub level: String,
    /// ログディレクトリ
    pub log_dir: PathBuf,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// ファイル出力有効
    pub file_enabled: bool,
    /// JSON 形式で出力
    pub json_format: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// 日次ローテーション
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

impl LogRotation {
    /// 設定文字列から変換（不明な値は Daily）
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => LogRotation::Hourly,
            "never" | "none" => LogRotation::Never,
            _ => LogRotation::Daily,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: get_default_log_dir(),
            rotation: LogRotation::Daily,
            console_enabled: true,
            file_enabled: false,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// コンソールのみのログ設定
    pub fn console(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// カスタムログディレクトリを設定（ファイル出力も有効にする）
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = dir.into();
        self.file_enabled = true;
        self
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    pub fn with_file(mut self, enabled: bool) -> Self {
        self.file_enabled = enabled;
        self
    }

    pub fn with_json(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

/// デフォルトログディレクトリを取得
/// 優先順位：
/// 1. カレントディレクトリの logs フォルダ
/// 2. システムテンプディレクトリの plugin-reliability フォルダ
fn get_default_log_dir() -> PathBuf {
    let current_log_dir = PathBuf::from("logs");
    if current_log_dir.is_dir() {
        return current_log_dir;
    }
    std::env::temp_dir().join("plugin-reliability").join("logs")
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    Ok(())
}

/// ログシステムを初期化
///
/// ファイル出力が有効な場合、返される guard をプロセス終了まで保持すること。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = None;

    if config.console_enabled || !config.file_enabled {
        let console = fmt::layer().with_target(true).with_writer(std::io::stderr);
        layers.push(if config.json_format {
            console.json().boxed()
        } else {
            console.boxed()
        });
    }

    if config.file_enabled {
        ensure_log_dir(&config.log_dir)?;
        let appender = match config.rotation {
            LogRotation::Daily => rolling::daily(&config.log_dir, LOG_FILE_PREFIX),
            LogRotation::Hourly => rolling::hourly(&config.log_dir, LOG_FILE_PREFIX),
            LogRotation::Never => rolling::never(&config.log_dir, LOG_FILE_PREFIX),
        };
        let (writer, file_guard) = non_blocking(appender);
        let file = fmt::layer().with_ansi(false).with_writer(writer);
        layers.push(if config.json_format {
            file.json().boxed()
        } else {
            file.boxed()
        });
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!("📝 Logging initialized (level: {})", config.level);
    if config.file_enabled {
        tracing::info!("📂 Log directory: {}", config.log_dir.display());
    }

    Ok(guard)
}
