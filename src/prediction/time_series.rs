//! Time Series Models
//!
//! コンポジットスコア系列に対する指数平滑化・移動平均予測

use super::scoring::{interval_around, mean, recent_volatility, CompositeScorer};
use super::types::{ModelKind, PredictionResult};
use super::ReliabilityModel;
use crate::telemetry::FeatureVector;
use async_trait::async_trait;

const MIN_CONFIDENCE: f64 = 0.1;

/// 指数平滑化モデル
#[derive(Debug, Clone)]
pub struct ExponentialSmoothingModel {
    scorer: CompositeScorer,
    /// 平滑化係数
    alpha: f64,
    volatility_window: usize,
    horizon_secs: u64,
}

impl ExponentialSmoothingModel {
    pub fn new(scorer: CompositeScorer, alpha: f64, volatility_window: usize, horizon_secs: u64) -> Self {
        Self {
            scorer,
            alpha,
            volatility_window,
            horizon_secs,
        }
    }

    /// 平滑化済みスコア（2点未満は None）
    pub fn smooth(&self, series: &[f64]) -> Option<f64> {
        if series.len() < 2 {
            return None;
        }

        let mut forecast = series[0];
        for &value in series.iter().skip(1) {
            forecast = self.alpha * value + (1.0 - self.alpha) * forecast;
        }
        Some(forecast)
    }

    pub fn predict_history(&self, plugin_id: &str, history: &[FeatureVector]) -> PredictionResult {
        let series = self.scorer.series(history);
        let Some(smoothed) = self.smooth(&series) else {
            return PredictionResult::neutral(plugin_id, self.kind(), self.horizon_secs);
        };

        let volatility = recent_volatility(&series, self.volatility_window);
        PredictionResult::new(
            plugin_id,
            self.kind(),
            smoothed,
            interval_around(smoothed, volatility),
            (1.0 - volatility).max(MIN_CONFIDENCE),
            self.horizon_secs,
        )
        .with_feature_importance(self.scorer.weight_importance())
    }
}

#[async_trait]
impl ReliabilityModel for ExponentialSmoothingModel {
    fn kind(&self) -> ModelKind {
        ModelKind::ExponentialSmoothing
    }

    async fn predict(&self, plugin_id: &str, history: &[FeatureVector]) -> PredictionResult {
        self.predict_history(plugin_id, history)
    }
}

/// 移動平均モデル
#[derive(Debug, Clone)]
pub struct MovingAverageModel {
    scorer: CompositeScorer,
    window: usize,
    volatility_window: usize,
    horizon_secs: u64,
}

impl MovingAverageModel {
    pub fn new(scorer: CompositeScorer, window: usize, volatility_window: usize, horizon_secs: u64) -> Self {
        Self {
            scorer,
            window,
            volatility_window,
            horizon_secs,
        }
    }

    pub fn predict_history(&self, plugin_id: &str, history: &[FeatureVector]) -> PredictionResult {
        let series = self.scorer.series(history);
        if series.is_empty() {
            return PredictionResult::neutral(plugin_id, self.kind(), self.horizon_secs);
        }

        let start = series.len().saturating_sub(self.window);
        let average = mean(&series[start..]);
        let volatility = recent_volatility(&series, self.volatility_window);
        PredictionResult::new(
            plugin_id,
            self.kind(),
            average,
            interval_around(average, volatility),
            (1.0 - volatility).max(MIN_CONFIDENCE),
            self.horizon_secs,
        )
        .with_feature_importance(self.scorer.weight_importance())
    }
}

#[async_trait]
impl ReliabilityModel for MovingAverageModel {
    fn kind(&self) -> ModelKind {
        ModelKind::MovingAverage
    }

    async fn predict(&self, plugin_id: &str, history: &[FeatureVector]) -> PredictionResult {
        self.predict_history(plugin_id, history)
    }
}
