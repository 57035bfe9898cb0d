//! Engine Configuration
//!
//! エンジン設定（重み・閾値・タイムアウト・モデルパラメータ）と
//! レイヤードな設定ローダー

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    BanditConfig, CompositeWeights, EngineConfig, FeatureConfig, HealthConfig, MonitoringConfig,
    PersistenceConfig, PredictionConfig, ProbeConfig, ProbeWeights, StatusThresholds,
};
