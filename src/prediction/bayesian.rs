//! Bayesian Inference Model
//!
//! プラグインごとのベータ分布による成功確率の事後推定

use super::scoring::interval_around;
use super::types::{ModelKind, PredictionResult};
use super::ReliabilityModel;
use crate::telemetry::FeatureVector;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

const SUCCESS_THRESHOLD: f64 = 0.8;
const FAILURE_THRESHOLD: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.95;
const CONFIDENCE_PSEUDO_COUNT: f64 = 10.0;

/// ベータ事前分布（更新により事後分布になる）
#[derive(Debug, Clone, PartialEq)]
pub struct BayesianPrior {
    pub alpha: f64,
    pub beta: f64,
    initial_alpha: f64,
    initial_beta: f64,
}

impl BayesianPrior {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self::restore(alpha, beta, alpha, beta)
    }

    /// 保存済みパラメータから復元
    pub fn restore(alpha: f64, beta: f64, initial_alpha: f64, initial_beta: f64) -> Self {
        Self {
            alpha,
            beta,
            initial_alpha,
            initial_beta,
        }
    }

    pub fn update(&mut self, successes: f64, failures: f64) {
        self.alpha += successes.max(0.0);
        self.beta += failures.max(0.0);
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let total = self.alpha + self.beta;
        (self.alpha * self.beta) / (total.powi(2) * (total + 1.0))
    }

    /// 初期事前分布を超えて加算された疑似観測数
    pub fn observations(&self) -> f64 {
        (self.alpha + self.beta - self.initial_alpha - self.initial_beta).max(0.0)
    }

    pub fn initial(&self) -> (f64, f64) {
        (self.initial_alpha, self.initial_beta)
    }
}

/// ベイズ推定モデル
pub struct BayesianModel {
    prior_alpha: f64,
    prior_beta: f64,
    horizon_secs: u64,
    priors: Mutex<HashMap<String, BayesianPrior>>,
}

impl BayesianModel {
    pub fn new(prior_alpha: f64, prior_beta: f64, horizon_secs: u64) -> Self {
        Self {
            prior_alpha,
            prior_beta,
            horizon_secs,
            priors: Mutex::new(HashMap::new()),
        }
    }

    /// 観測1件で事後分布を更新
    pub async fn update_from(&self, observation: &FeatureVector) {
        let update = if observation.success_rate > SUCCESS_THRESHOLD {
            Some((1.0, 0.0))
        } else if observation.success_rate < FAILURE_THRESHOLD {
            Some((0.0, 1.0))
        } else {
            None
        };

        if let Some((successes, failures)) = update {
            let mut priors = self.priors.lock().await;
            priors
                .entry(observation.plugin_id.clone())
                .or_insert_with(|| BayesianPrior::new(self.prior_alpha, self.prior_beta))
                .update(successes, failures);
        }
    }

    pub async fn posterior(&self, plugin_id: &str) -> BayesianPrior {
        self.priors
            .lock()
            .await
            .get(plugin_id)
            .cloned()
            .unwrap_or_else(|| BayesianPrior::new(self.prior_alpha, self.prior_beta))
    }

    pub async fn posterior_mean(&self, plugin_id: &str) -> f64 {
        self.posterior(plugin_id).await.mean()
    }

    pub async fn export(&self) -> HashMap<String, BayesianPrior> {
        self.priors.lock().await.clone()
    }

    pub async fn restore(&self, priors: HashMap<String, BayesianPrior>) {
        *self.priors.lock().await = priors;
    }

    pub async fn remove(&self, plugin_id: &str) {
        self.priors.lock().await.remove(plugin_id);
    }
}

#[async_trait]
impl ReliabilityModel for BayesianModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Bayesian
    }

    async fn observe(&self, observation: &FeatureVector) {
        self.update_from(observation).await;
    }

    async fn predict(&self, plugin_id: &str, _history: &[FeatureVector]) -> PredictionResult {
        let posterior = self.posterior(plugin_id).await;
        let mean = posterior.mean();
        let n = posterior.observations();

        PredictionResult::new(
            plugin_id,
            self.kind(),
            mean,
            interval_around(mean, posterior.variance().sqrt()),
            (n / (n + CONFIDENCE_PSEUDO_COUNT)).min(MAX_CONFIDENCE),
            self.horizon_secs,
        )
        .with_feature_importance(HashMap::from([("success_rate".to_string(), 1.0)]))
    }
}
