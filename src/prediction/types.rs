//! Prediction Types
//!
//! 予測結果の型定義

use crate::config::StatusThresholds;
use crate::health::{clamp_unit, HealthStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 予測モデルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// 指数平滑化
    ExponentialSmoothing,
    /// 移動平均
    MovingAverage,
    /// ベイズ推定
    Bayesian,
    /// 多腕バンディット
    Bandit,
    /// アンサンブル
    Ensemble,
}

impl ModelKind {
    /// アンサンブルを構成する個別モデル
    pub const CONSTITUENTS: [ModelKind; 4] = [
        ModelKind::ExponentialSmoothing,
        ModelKind::MovingAverage,
        ModelKind::Bayesian,
        ModelKind::Bandit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::ExponentialSmoothing => "exponential_smoothing",
            ModelKind::MovingAverage => "moving_average",
            ModelKind::Bayesian => "bayesian",
            ModelKind::Bandit => "bandit",
            ModelKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 予測結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub plugin_id: String,
    /// 予測スコア（0.0-1.0）
    pub predicted_score: f64,
    /// 信頼区間 (下限, 上限)
    pub confidence_interval: (f64, f64),
    /// 信頼度（0.0-1.0）
    pub confidence: f64,
    pub model_used: ModelKind,
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
    pub prediction_horizon_seconds: u64,
}

impl PredictionResult {
    /// 新しい予測結果を作成
    ///
    /// 値は 0.0-1.0 に丸められ、区間は必ず予測スコアを含む。
    pub fn new(
        plugin_id: impl Into<String>,
        model_used: ModelKind,
        predicted_score: f64,
        confidence_interval: (f64, f64),
        confidence: f64,
        prediction_horizon_seconds: u64,
    ) -> Self {
        let score = clamp_unit(predicted_score);
        let lower = clamp_unit(confidence_interval.0).min(score);
        let upper = clamp_unit(confidence_interval.1).max(score);
        Self {
            plugin_id: plugin_id.into(),
            predicted_score: score,
            confidence_interval: (lower, upper),
            confidence: clamp_unit(confidence),
            model_used,
            feature_importance: HashMap::new(),
            prediction_horizon_seconds,
        }
    }

    /// 履歴が不十分な場合の中立的な予測
    pub fn neutral(
        plugin_id: impl Into<String>,
        model_used: ModelKind,
        prediction_horizon_seconds: u64,
    ) -> Self {
        Self::new(
            plugin_id,
            model_used,
            NEUTRAL_SCORE,
            (0.0, 1.0),
            0.0,
            prediction_horizon_seconds,
        )
    }

    pub fn with_feature_importance(mut self, importance: HashMap<String, f64>) -> Self {
        self.feature_importance = importance;
        self
    }

    /// 予測スコアをステータスに変換
    pub fn status(&self, thresholds: &StatusThresholds) -> HealthStatus {
        thresholds.classify(self.predicted_score)
    }
}

/// 中立スコア
pub const NEUTRAL_SCORE: f64 = 0.5;
