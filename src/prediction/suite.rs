//! Model Suite
//!
//! 4つの予測モデルとアンサンブルをまとめて扱う

use super::bandit::MultiArmedBandit;
use super::bayesian::BayesianModel;
use super::ensemble;
use super::scoring::CompositeScorer;
use super::time_series::{ExponentialSmoothingModel, MovingAverageModel};
use super::types::{ModelKind, PredictionResult};
use super::ReliabilityModel;
use crate::config::EngineConfig;
use crate::telemetry::FeatureVector;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct ModelSuite {
    scorer: CompositeScorer,
    horizon_secs: u64,
    smoothing: ExponentialSmoothingModel,
    moving_average: MovingAverageModel,
    bayesian: BayesianModel,
    bandit: Arc<MultiArmedBandit>,
}

impl ModelSuite {
    pub fn new(config: &EngineConfig) -> Self {
        let prediction = &config.prediction;
        let scorer = CompositeScorer::new(prediction.composite_weights.clone());

        Self {
            smoothing: ExponentialSmoothingModel::new(
                scorer.clone(),
                prediction.smoothing_alpha,
                prediction.volatility_window,
                prediction.horizon_secs,
            ),
            moving_average: MovingAverageModel::new(
                scorer.clone(),
                prediction.moving_average_window,
                prediction.volatility_window,
                prediction.horizon_secs,
            ),
            bayesian: BayesianModel::new(
                prediction.prior_alpha,
                prediction.prior_beta,
                prediction.horizon_secs,
            ),
            bandit: Arc::new(MultiArmedBandit::new(
                config.bandit.clone(),
                prediction.horizon_secs,
            )),
            horizon_secs: prediction.horizon_secs,
            scorer,
        }
    }

    pub fn scorer(&self) -> &CompositeScorer {
        &self.scorer
    }

    pub fn bayesian(&self) -> &BayesianModel {
        &self.bayesian
    }

    pub fn bandit(&self) -> Arc<MultiArmedBandit> {
        Arc::clone(&self.bandit)
    }

    fn constituents(&self) -> [&dyn ReliabilityModel; 4] {
        [
            &self.smoothing,
            &self.moving_average,
            &self.bayesian,
            self.bandit.as_ref(),
        ]
    }

    /// 新しい観測を状態を持つモデルに通知
    pub async fn observe(&self, observation: &FeatureVector) {
        for model in self.constituents() {
            model.observe(observation).await;
        }
    }

    /// 指定モデルで予測（Ensemble も可）
    pub async fn predict(
        &self,
        kind: ModelKind,
        plugin_id: &str,
        history: &[FeatureVector],
    ) -> PredictionResult {
        match kind {
            ModelKind::Ensemble => self.predict_ensemble(plugin_id, history).await,
            _ => {
                let model = self
                    .constituents()
                    .into_iter()
                    .find(|m| m.kind() == kind);
                match model {
                    Some(model) => model.predict(plugin_id, history).await,
                    None => PredictionResult::neutral(plugin_id, kind, self.horizon_secs),
                }
            }
        }
    }

    /// 全モデルの予測を統合
    pub async fn predict_ensemble(
        &self,
        plugin_id: &str,
        history: &[FeatureVector],
    ) -> PredictionResult {
        let predictions = join_all(
            self.constituents()
                .into_iter()
                .map(|model| model.predict(plugin_id, history)),
        )
        .await;

        for prediction in &predictions {
            debug!(
                "{} prediction for {}: score={:.3} confidence={:.3}",
                prediction.model_used, plugin_id, prediction.predicted_score, prediction.confidence
            );
        }

        ensemble::combine(plugin_id, &predictions, self.horizon_secs)
            .with_feature_importance(self.feature_importance(history))
    }

    pub fn feature_importance(&self, history: &[FeatureVector]) -> HashMap<String, f64> {
        ensemble::feature_importance(&self.scorer, history)
    }

    pub async fn forget(&self, plugin_id: &str) {
        self.bayesian.remove(plugin_id).await;
        self.bandit.remove_arm(plugin_id).await;
    }

    pub async fn reset(&self) {
        self.bayesian.restore(HashMap::new()).await;
        self.bandit.reset().await;
    }
}
