//! Ensemble Combiner
//!
//! 個別モデルの予測を信頼度で重み付けして統合する

use super::scoring::{mean, pearson, CompositeScorer};
use super::types::{ModelKind, PredictionResult, NEUTRAL_SCORE};
use crate::telemetry::FeatureVector;
use std::collections::HashMap;

/// 全モデルの信頼度が 0 のときの信頼度
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// 信頼度加重平均で予測を統合
pub fn combine(
    plugin_id: &str,
    predictions: &[PredictionResult],
    horizon_secs: u64,
) -> PredictionResult {
    if predictions.is_empty() {
        return PredictionResult::neutral(plugin_id, ModelKind::Ensemble, horizon_secs);
    }

    let confidence_sum: f64 = predictions.iter().map(|p| p.confidence).sum();
    let lower = mean(
        &predictions
            .iter()
            .map(|p| p.confidence_interval.0)
            .collect::<Vec<_>>(),
    );
    let upper = mean(
        &predictions
            .iter()
            .map(|p| p.confidence_interval.1)
            .collect::<Vec<_>>(),
    );

    let (score, confidence) = if confidence_sum <= 0.0 {
        (NEUTRAL_SCORE, FALLBACK_CONFIDENCE)
    } else {
        let weighted: f64 = predictions
            .iter()
            .map(|p| p.predicted_score * p.confidence)
            .sum();
        (
            weighted / confidence_sum,
            confidence_sum / predictions.len() as f64,
        )
    };

    // 区間の拡張は PredictionResult::new が行う
    PredictionResult::new(
        plugin_id,
        ModelKind::Ensemble,
        score,
        (lower, upper),
        confidence,
        horizon_secs,
    )
}

/// 各数値特徴量とコンポジットスコア系列の相関の絶対値
///
/// 値が1種類しかない特徴量（または欠損・非有限値を含む特徴量）は除外する。
pub fn feature_importance(scorer: &CompositeScorer, history: &[FeatureVector]) -> HashMap<String, f64> {
    let mut importance = HashMap::new();
    if history.len() < 2 {
        return importance;
    }

    let composites = scorer.series(history);
    let feature_count = history[0].numeric_features().len();

    for index in 0..feature_count {
        let name = history[0].numeric_features()[index].0;
        let values: Option<Vec<f64>> = history
            .iter()
            .map(|o| o.numeric_features()[index].1)
            .collect();
        let Some(values) = values else {
            continue;
        };
        if values.iter().any(|v| !v.is_finite()) {
            continue;
        }

        let first = values[0];
        if values.iter().all(|v| (v - first).abs() < f64::EPSILON) {
            continue;
        }

        if let Some(r) = pearson(&values, &composites).filter(|r| r.is_finite()) {
            importance.insert(name.to_string(), r.abs().min(1.0));
        }
    }

    importance
}
