//! Plugin Capabilities
//!
//! 監視対象プラグインが任意で実装するケイパビリティ。
//! プラグインは `MonitoredPlugin` のアクセサを上書きすることで各ケイパビリティを公開し、
//! コーディネーターはアクセサが `Some` を返すかどうかでプローブ手段を選ぶ。

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// 明示的な接続状態フラグ
#[async_trait]
pub trait ConnectionStatus: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// 往復時間を計測できる HTTP エンドポイント
pub trait HttpEndpoint: Send + Sync {
    fn endpoint_url(&self) -> String;
}

/// TCP 到達性を確認できる host:port
pub trait SocketEndpoint: Send + Sync {
    fn host_port(&self) -> (String, u16);
}

/// 明示的なヘルスチェック呼び出し
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> Result<()>;
}

/// 基本メタデータ（軽量な計時対象操作としても使う）
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn info(&self) -> Result<HashMap<String, serde_json::Value>>;
}

/// サンプルデータ
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn sample_data(&self) -> Result<serde_json::Value>;
}

/// 最終更新時刻
#[async_trait]
pub trait FreshnessSource: Send + Sync {
    async fn last_update_time(&self) -> Result<DateTime<Utc>>;
}

/// 自己申告の整合性スコア（0.0-1.0）
#[async_trait]
pub trait ConsistencySource: Send + Sync {
    async fn validate_consistency(&self) -> Result<f64>;
}

/// 監視対象プラグイン
///
/// 既定ではどのケイパビリティも公開しない。公開しないケイパビリティは
/// 各プローブの規定どおり劣化した既定値で扱われる。
pub trait MonitoredPlugin: Send + Sync {
    fn connection_status(&self) -> Option<&dyn ConnectionStatus> {
        None
    }

    fn http_endpoint(&self) -> Option<&dyn HttpEndpoint> {
        None
    }

    fn socket_endpoint(&self) -> Option<&dyn SocketEndpoint> {
        None
    }

    fn health_checkable(&self) -> Option<&dyn HealthCheckable> {
        None
    }

    fn metadata_source(&self) -> Option<&dyn MetadataSource> {
        None
    }

    fn sample_source(&self) -> Option<&dyn SampleSource> {
        None
    }

    fn freshness_source(&self) -> Option<&dyn FreshnessSource> {
        None
    }

    fn consistency_source(&self) -> Option<&dyn ConsistencySource> {
        None
    }
}

/// 推定リソース使用量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    /// CPU使用率（%）
    pub cpu_percent: f64,
    /// メモリ使用率（%）
    pub memory_percent: f64,
}

impl ResourceUsage {
    /// ピーク使用率に基づくサブスコア
    pub fn headroom_score(&self) -> f64 {
        let peak = self.cpu_percent.max(self.memory_percent);
        (1.0 - peak / 100.0).clamp(0.0, 1.0)
    }

    /// 平均使用率に基づく効率スコア
    pub fn efficiency_score(&self) -> f64 {
        let mean = (self.cpu_percent + self.memory_percent) / 2.0;
        (1.0 - mean / 100.0).clamp(0.0, 1.0)
    }
}

/// プラグインごとのリソース使用量を外部から供給する
pub trait ResourceEstimator: Send + Sync {
    fn estimate(&self, plugin_id: &str) -> Option<ResourceUsage>;
}

/// 推定値を持たない既定の推定器
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResourceEstimate;

impl ResourceEstimator for NoResourceEstimate {
    fn estimate(&self, _plugin_id: &str) -> Option<ResourceUsage> {
        None
    }
}
