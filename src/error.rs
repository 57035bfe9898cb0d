//! Error types for the reliability engine.
//!
//! 実行時のエラー（プローブ・集約・永続化）はデータとして呼び出し元へ返され、
//! 構築時の設定エラーのみが即座に失敗します。

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// エンジンのエラー種別
#[derive(Debug, Error)]
pub enum Error {
    /// 個別プローブの失敗（Unhealthy な CheckResult に変換される）
    #[error("Probe error: {0}")]
    Probe(String),

    /// コーディネーターレベルの失敗（Unknown プロファイルになる）
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// 保存・読み込みの失敗
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 不正な重み・閾値（構築時に検出）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// プラグイン側のケイパビリティ実装が返すエラー
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// タイムアウト
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 設定ソースの読み込みエラー
    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

impl Error {
    /// 構造化ログ用の短い分類名
    pub fn category(&self) -> &'static str {
        match self {
            Error::Probe(_) => "probe",
            Error::Aggregation(_) => "aggregation",
            Error::Persistence(_) => "persistence",
            Error::Configuration(_) | Error::ConfigSource(_) => "configuration",
            Error::Plugin(_) => "plugin",
            Error::Timeout(_) => "timeout",
            Error::Network(_) => "network",
            Error::Json(_) | Error::Io(_) => "io",
        }
    }
}
