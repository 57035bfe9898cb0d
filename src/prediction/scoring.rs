//! Composite Scoring
//!
//! 観測ごとのコンポジットスコアと統計ヘルパー

use crate::config::CompositeWeights;
use crate::health::clamp_unit;
use crate::telemetry::FeatureVector;
use std::collections::HashMap;

/// 95% 信頼区間の z 値
pub const Z_95: f64 = 1.96;

const RESPONSE_TIME_CEILING_MS: f64 = 5_000.0;
const FAILURE_COUNT_CEILING: f64 = 10.0;
const FAILURE_RECOVERY_SECS: f64 = 3_600.0;
const LATENCY_CEILING_MS: f64 = 1_000.0;
const VOLUME_SATURATION: f64 = 100.0;

/// 重みテーブルに基づくコンポジットスコア計算
#[derive(Debug, Clone)]
pub struct CompositeScorer {
    weights: CompositeWeights,
}

impl CompositeScorer {
    pub fn new(weights: CompositeWeights) -> Self {
        Self { weights }
    }

    /// 1観測のスコア（0.0-1.0）
    pub fn score(&self, observation: &FeatureVector) -> f64 {
        let w = &self.weights;
        let response_time_score =
            (1.0 - observation.avg_response_time / RESPONSE_TIME_CEILING_MS).max(0.0);
        let failure_count_score =
            (1.0 - observation.failure_count as f64 / FAILURE_COUNT_CEILING).max(0.0);
        let time_since_failure_score = observation
            .seconds_since_last_failure
            .map(|secs| (secs / FAILURE_RECOVERY_SECS).clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let latency_score = (1.0 - observation.network_latency / LATENCY_CEILING_MS).max(0.0);
        let volume_score = (observation.request_volume / VOLUME_SATURATION).clamp(0.0, 1.0);

        let total = w.success_rate * clamp_unit(observation.success_rate)
            + w.response_time * response_time_score
            + w.failure_count * failure_count_score
            + w.time_since_failure * time_since_failure_score
            + w.data_quality * clamp_unit(observation.data_quality_score)
            + w.network_latency * latency_score
            + w.request_volume * volume_score
            + w.seasonal_factor * clamp_unit(observation.seasonal_factor);
        clamp_unit(total)
    }

    /// 履歴全体のスコア系列
    pub fn series(&self, history: &[FeatureVector]) -> Vec<f64> {
        history.iter().map(|o| self.score(o)).collect()
    }

    /// 重みテーブルを特徴量重要度として返す
    pub fn weight_importance(&self) -> HashMap<String, f64> {
        self.weights
            .entries()
            .iter()
            .map(|(name, weight)| (name.to_string(), *weight))
            .collect()
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 母標準偏差（2点未満は 0）
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// 直近 `window` 件の標準偏差
pub fn recent_volatility(series: &[f64], window: usize) -> f64 {
    let start = series.len().saturating_sub(window);
    std_dev(&series[start..])
}

/// ピアソン相関係数（分散が 0 なら None）
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = mean(xs);
    let y_mean = mean(ys);

    let mut covariance = 0.0;
    let mut x_var = 0.0;
    let mut y_var = 0.0;
    for i in 0..n {
        let dx = xs[i] - x_mean;
        let dy = ys[i] - y_mean;
        covariance += dx * dy;
        x_var += dx * dx;
        y_var += dy * dy;
    }

    if x_var < f64::EPSILON || y_var < f64::EPSILON {
        return None;
    }
    Some(covariance / (x_var.sqrt() * y_var.sqrt()))
}

/// 中心値 ± z·spread の区間（0.0-1.0 に丸める）
pub fn interval_around(center: f64, spread: f64) -> (f64, f64) {
    (
        clamp_unit(center - Z_95 * spread),
        clamp_unit(center + Z_95 * spread),
    )
}
