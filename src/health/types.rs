//! Health Types
//!
//! ヘルスチェックの型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// プラグインのヘルス状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// 正常
    Healthy,
    /// 性能低下
    Degraded,
    /// 異常（チェック済みで失敗）
    Unhealthy,
    /// 不明（チェックできなかった）
    Unknown,
}

impl HealthStatus {
    /// チェック済みステータスの順序（Unhealthy < Degraded < Healthy）
    ///
    /// Unknown は比較対象外のため最下位として扱う。
    pub fn rank(&self) -> u8 {
        match self {
            HealthStatus::Unknown => 0,
            HealthStatus::Unhealthy => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Healthy => 3,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// プローブ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Connectivity,
    Application,
    DataQuality,
    Performance,
}

impl CheckKind {
    /// 全種別（集約順）
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Connectivity,
        CheckKind::Application,
        CheckKind::DataQuality,
        CheckKind::Performance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Connectivity => "connectivity",
            CheckKind::Application => "application",
            CheckKind::DataQuality => "data_quality",
            CheckKind::Performance => "performance",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 単一プローブの結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub plugin_id: String,
    pub kind: CheckKind,
    pub status: HealthStatus,
    /// スコア（0.0-1.0）
    pub score: f64,
    pub response_time_ms: f64,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl CheckResult {
    /// 新しい結果を作成（スコアは 0.0-1.0 に丸める）
    pub fn new(
        plugin_id: impl Into<String>,
        kind: CheckKind,
        status: HealthStatus,
        score: f64,
        response_time_ms: f64,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            kind,
            status,
            score: clamp_unit(score),
            response_time_ms: response_time_ms.max(0.0),
            details: HashMap::new(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// 失敗したプローブの結果
    pub fn failed(
        plugin_id: impl Into<String>,
        kind: CheckKind,
        error: impl Into<String>,
        response_time_ms: f64,
    ) -> Self {
        let mut result = Self::new(plugin_id, kind, HealthStatus::Unhealthy, 0.0, response_time_ms);
        let mut message = error.into();
        if message.is_empty() {
            message = format!("{} probe failed", kind);
        }
        result.error = Some(message);
        result
    }

    /// 詳細情報を追加
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// プラグインごとのヘルスプロファイル
///
/// コーディネーターのみが更新し、1回のチェックサイクルの更新は
/// 常に一括で反映される。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginHealthProfile {
    pub plugin_id: String,
    pub overall_status: HealthStatus,
    pub overall_score: f64,
    pub last_check_time: Option<DateTime<Utc>>,
    pub checks: HashMap<CheckKind, CheckResult>,
    /// (時刻, スコア) の履歴
    pub historical_scores: VecDeque<(DateTime<Utc>, f64)>,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub recovery_time: Option<DateTime<Utc>>,
}

impl PluginHealthProfile {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            overall_status: HealthStatus::Unknown,
            overall_score: 0.0,
            last_check_time: None,
            checks: HashMap::new(),
            historical_scores: VecDeque::new(),
            failure_count: 0,
            consecutive_failures: 0,
            last_failure_time: None,
            recovery_time: None,
        }
    }

    /// 直近の平均応答時間（ms）
    pub fn average_response_time_ms(&self) -> f64 {
        if self.checks.is_empty() {
            return 0.0;
        }
        self.checks.values().map(|c| c.response_time_ms).sum::<f64>() / self.checks.len() as f64
    }

    /// 直近サイクルで Unhealthy でなかったプローブの割合
    pub fn check_success_rate(&self) -> f64 {
        if self.checks.is_empty() {
            return 0.0;
        }
        let passed = self
            .checks
            .values()
            .filter(|c| !c.status.is_failure())
            .count();
        passed as f64 / self.checks.len() as f64
    }
}

/// エンジン全体のヘルス概要
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSummary {
    /// 総プラグイン数
    pub total_plugins: usize,
    pub healthy_plugins: usize,
    pub degraded_plugins: usize,
    pub unhealthy_plugins: usize,
    /// チェックできなかったプラグイン数
    pub unknown_plugins: usize,
    /// 全体スコアの平均
    pub average_score: f64,
}

impl HealthSummary {
    pub fn system_status(&self) -> HealthStatus {
        if self.total_plugins == 0 {
            HealthStatus::Unknown
        } else if self.unhealthy_plugins == 0 && self.degraded_plugins == 0 && self.unknown_plugins == 0
        {
            HealthStatus::Healthy
        } else if self.healthy_plugins > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
