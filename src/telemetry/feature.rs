//! Feature Vector
//!
//! 予測モデルの入力となるプラグインごとの観測値

use crate::health::{CheckKind, PluginHealthProfile, ResourceUsage};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// 1回分の観測
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub plugin_id: String,
    pub timestamp: DateTime<Utc>,
    /// 成功率（0.0-1.0）
    pub success_rate: f64,
    /// 平均応答時間（ms）
    pub avg_response_time: f64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    /// 最後の失敗からの経過秒数（失敗なしは None）
    pub seconds_since_last_failure: Option<f64>,
    /// リクエスト数
    pub request_volume: f64,
    pub data_quality_score: f64,
    /// ネットワーク遅延（ms）
    pub network_latency: f64,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub hour_of_day: u32,
    /// 月曜 = 0
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub seasonal_factor: f64,
}

impl FeatureVector {
    /// 現在時刻の既定値で観測を作成
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self::at(plugin_id, Utc::now())
    }

    /// 指定時刻の既定値で観測を作成
    pub fn at(plugin_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            timestamp,
            success_rate: 0.0,
            avg_response_time: 0.0,
            failure_count: 0,
            consecutive_failures: 0,
            seconds_since_last_failure: None,
            request_volume: 0.0,
            data_quality_score: 1.0,
            network_latency: 0.0,
            cpu_usage: None,
            memory_usage: None,
            hour_of_day: timestamp.hour(),
            day_of_week: timestamp.weekday().num_days_from_monday(),
            is_weekend: timestamp.weekday().num_days_from_monday() >= 5,
            seasonal_factor: 1.0,
        }
    }

    /// ヘルスチェック結果から観測を導出
    pub fn from_profile(profile: &PluginHealthProfile, usage: Option<ResourceUsage>) -> Self {
        let timestamp = profile.last_check_time.unwrap_or_else(Utc::now);
        let mut vector = Self::at(profile.plugin_id.clone(), timestamp);

        vector.success_rate = profile.check_success_rate();
        vector.avg_response_time = profile.average_response_time_ms();
        vector.failure_count = profile.failure_count;
        vector.consecutive_failures = profile.consecutive_failures;
        vector.seconds_since_last_failure = profile
            .last_failure_time
            .map(|t| ((timestamp - t).num_milliseconds() as f64 / 1_000.0).max(0.0));
        vector.data_quality_score = profile
            .checks
            .get(&CheckKind::DataQuality)
            .map(|c| c.score)
            .unwrap_or(0.0);
        vector.network_latency = profile
            .checks
            .get(&CheckKind::Connectivity)
            .map(|c| c.response_time_ms)
            .unwrap_or(0.0);
        if let Some(usage) = usage {
            vector.cpu_usage = Some(usage.cpu_percent);
            vector.memory_usage = Some(usage.memory_percent);
        }
        vector
    }

    /// 有限でない値を既定値に戻し、比率を 0.0-1.0 に収める
    pub fn sanitized(mut self) -> Self {
        fn finite_or(value: f64, fallback: f64) -> f64 {
            if value.is_finite() {
                value
            } else {
                fallback
            }
        }

        self.success_rate = finite_or(self.success_rate, 0.0).clamp(0.0, 1.0);
        self.data_quality_score = finite_or(self.data_quality_score, 1.0).clamp(0.0, 1.0);
        self.avg_response_time = finite_or(self.avg_response_time, 0.0).max(0.0);
        self.request_volume = finite_or(self.request_volume, 0.0).max(0.0);
        self.network_latency = finite_or(self.network_latency, 0.0).max(0.0);
        self.seasonal_factor = finite_or(self.seasonal_factor, 1.0);
        self.seconds_since_last_failure = self
            .seconds_since_last_failure
            .filter(|v| v.is_finite())
            .map(|v| v.max(0.0));
        self.cpu_usage = self.cpu_usage.filter(|v| v.is_finite());
        self.memory_usage = self.memory_usage.filter(|v| v.is_finite());
        self
    }

    /// 数値特徴量の一覧（特徴量重要度の計算に使う）
    pub fn numeric_features(&self) -> [(&'static str, Option<f64>); 13] {
        [
            ("success_rate", Some(self.success_rate)),
            ("avg_response_time", Some(self.avg_response_time)),
            ("failure_count", Some(self.failure_count as f64)),
            ("consecutive_failures", Some(self.consecutive_failures as f64)),
            ("seconds_since_last_failure", self.seconds_since_last_failure),
            ("request_volume", Some(self.request_volume)),
            ("data_quality_score", Some(self.data_quality_score)),
            ("network_latency", Some(self.network_latency)),
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
            ("hour_of_day", Some(self.hour_of_day as f64)),
            ("day_of_week", Some(self.day_of_week as f64)),
            ("seasonal_factor", Some(self.seasonal_factor)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckResult, HealthStatus};
    use chrono::TimeZone;

    #[test]
    fn test_calendar_features() {
        // 2026-10-17 は土曜日
        let saturday = Utc.with_ymd_and_hms(2026, 10, 17, 14, 30, 0).unwrap();
        let vector = FeatureVector::at("p", saturday);
        assert_eq!(vector.hour_of_day, 14);
        assert_eq!(vector.day_of_week, 5);
        assert!(vector.is_weekend);
    }

    #[test]
    fn test_from_profile() {
        let now = Utc::now();
        let mut profile = PluginHealthProfile::new("p");
        profile.last_check_time = Some(now);
        profile.failure_count = 2;
        profile.last_failure_time = Some(now - chrono::Duration::seconds(120));
        profile.checks.insert(
            CheckKind::Connectivity,
            CheckResult::new("p", CheckKind::Connectivity, HealthStatus::Healthy, 1.0, 40.0),
        );
        profile.checks.insert(
            CheckKind::DataQuality,
            CheckResult::new("p", CheckKind::DataQuality, HealthStatus::Degraded, 0.6, 0.0),
        );
        profile.checks.insert(
            CheckKind::Application,
            CheckResult::failed("p", CheckKind::Application, "down", 20.0),
        );

        let vector = FeatureVector::from_profile(
            &profile,
            Some(ResourceUsage {
                cpu_percent: 10.0,
                memory_percent: 30.0,
            }),
        );

        assert!((vector.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((vector.avg_response_time - 20.0).abs() < 1e-9);
        assert_eq!(vector.network_latency, 40.0);
        assert_eq!(vector.data_quality_score, 0.6);
        assert_eq!(vector.failure_count, 2);
        assert!((vector.seconds_since_last_failure.unwrap() - 120.0).abs() < 1e-6);
        assert_eq!(vector.cpu_usage, Some(10.0));
    }

    #[test]
    fn test_sanitized_replaces_non_finite_values() {
        let mut vector = FeatureVector::new("p");
        vector.success_rate = 1.7;
        vector.avg_response_time = f64::NAN;
        vector.network_latency = f64::INFINITY;
        vector.data_quality_score = f64::NEG_INFINITY;
        vector.seconds_since_last_failure = Some(f64::NAN);
        vector.cpu_usage = Some(f64::INFINITY);
        vector.memory_usage = Some(42.0);

        let vector = vector.sanitized();
        assert_eq!(vector.success_rate, 1.0);
        assert_eq!(vector.avg_response_time, 0.0);
        assert_eq!(vector.network_latency, 0.0);
        assert_eq!(vector.data_quality_score, 1.0);
        assert_eq!(vector.seconds_since_last_failure, None);
        assert_eq!(vector.cpu_usage, None);
        assert_eq!(vector.memory_usage, Some(42.0));
    }
}
