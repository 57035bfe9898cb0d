//! Health Check Module
//!
//! プラグインのヘルスチェック（プローブ実行・集約・履歴管理）

pub mod capabilities;
pub mod coordinator;
pub mod probes;
mod types;

pub use capabilities::{
    ConnectionStatus, ConsistencySource, FreshnessSource, HealthCheckable, HttpEndpoint,
    MetadataSource, MonitoredPlugin, NoResourceEstimate, ResourceEstimator, ResourceUsage,
    SampleSource, SocketEndpoint,
};
pub use coordinator::HealthCheckCoordinator;
pub use probes::{HealthProbe, ProbeContext};
pub use types::{CheckKind, CheckResult, HealthStatus, HealthSummary, PluginHealthProfile};
pub(crate) use types::clamp_unit;
