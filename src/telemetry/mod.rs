//! Telemetry Module
//!
//! 観測値（特徴量ベクトル）の記録

mod feature;
mod recorder;

pub use feature::FeatureVector;
pub use recorder::FeatureRecorder;
