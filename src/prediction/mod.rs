//! Reliability Prediction Module
//!
//! 観測履歴からプラグインの信頼性を予測する

pub mod bandit;
pub mod bayesian;
pub mod ensemble;
pub mod scoring;
mod suite;
pub mod time_series;
mod types;

pub use bandit::{ArmSelection, ArmStatistics, BanditState, MultiArmedBandit};
pub use bayesian::{BayesianModel, BayesianPrior};
pub use scoring::CompositeScorer;
pub use suite::ModelSuite;
pub use time_series::{ExponentialSmoothingModel, MovingAverageModel};
pub use types::{ModelKind, PredictionResult, NEUTRAL_SCORE};

use crate::telemetry::FeatureVector;
use async_trait::async_trait;

/// 予測モデル
#[async_trait]
pub trait ReliabilityModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// 新しい観測の通知（状態を持たないモデルは何もしない）
    async fn observe(&self, _observation: &FeatureVector) {}

    async fn predict(&self, plugin_id: &str, history: &[FeatureVector]) -> PredictionResult;
}
