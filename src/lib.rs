//! # plugin-reliability
//!
//! Reliability scoring and adaptive selection for interchangeable plugin backends.
//!
//! プラグインのヘルスチェック（接続・アプリケーション・データ品質・性能）を
//! 並行実行して複合スコアを算出し、観測履歴から信頼性を予測して、
//! 多腕バンディットでルーティング先を選択する。

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod persistence;
pub mod prediction;
pub mod selection;
pub mod telemetry;

pub use config::{ConfigLoader, EngineConfig};
pub use engine::ReliabilityEngine;
pub use error::{Error, Result};
pub use events::{ReliabilityEvent, ReliabilityEventType};
pub use health::{HealthStatus, MonitoredPlugin, PluginHealthProfile};
pub use prediction::{ModelKind, PredictionResult};
pub use telemetry::FeatureVector;
