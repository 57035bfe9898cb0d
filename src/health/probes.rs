//! Probe Executors
//!
//! 4種類の独立したヘルス計測戦略。
//! 各プローブは必ず1つの `CheckResult` を返すか、エラーを返す（エラーは
//! コーディネーター側で Unhealthy な結果に変換される）。

use super::capabilities::{MonitoredPlugin, ResourceEstimator};
use super::types::{clamp_unit, CheckKind, CheckResult, HealthStatus};
use crate::config::{ProbeConfig, StatusThresholds};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tracing::debug;

/// シグナルがない場合のデータ品質スコア（不明は完全ではない）
pub const UNKNOWN_DATA_QUALITY_SCORE: f64 = 0.7;
/// 計時対象の操作がない場合のパフォーマンススコア
pub const UNKNOWN_PERFORMANCE_SCORE: f64 = 0.7;
/// リソース推定がない場合のサブスコア
pub const UNKNOWN_RESOURCE_SCORE: f64 = 0.8;

const APPLICATION_WEIGHT: f64 = 0.7;
const RESOURCE_WEIGHT: f64 = 0.3;
const FRESH_SECS: f64 = 3_600.0;
const STALE_SECS: f64 = 24.0 * 3_600.0;

/// ヘルスプローブ
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn kind(&self) -> CheckKind;

    async fn probe(&self, plugin_id: &str, plugin: &dyn MonitoredPlugin) -> Result<CheckResult>;
}

/// プローブ間で共有する設定と依存
pub struct ProbeContext {
    pub config: ProbeConfig,
    pub thresholds: StatusThresholds,
    pub estimator: Arc<dyn ResourceEstimator>,
    http: reqwest::Client,
}

impl ProbeContext {
    pub fn new(
        config: ProbeConfig,
        thresholds: StatusThresholds,
        estimator: Arc<dyn ResourceEstimator>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout_for(CheckKind::Connectivity))
            .build()?;
        Ok(Self {
            config,
            thresholds,
            estimator,
            http,
        })
    }
}

/// 標準の4プローブを作成
pub fn default_probes(context: Arc<ProbeContext>) -> Vec<Arc<dyn HealthProbe>> {
    vec![
        Arc::new(ConnectivityProbe::new(context.clone())),
        Arc::new(ApplicationProbe::new(context.clone())),
        Arc::new(DataQualityProbe::new(context.clone())),
        Arc::new(PerformanceProbe::new(context)),
    ]
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

/// 接続性プローブ
pub struct ConnectivityProbe {
    context: Arc<ProbeContext>,
}

impl ConnectivityProbe {
    pub fn new(context: Arc<ProbeContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl HealthProbe for ConnectivityProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Connectivity
    }

    async fn probe(&self, plugin_id: &str, plugin: &dyn MonitoredPlugin) -> Result<CheckResult> {
        let started = Instant::now();

        // 1. 明示的な接続フラグ
        if let Some(status) = plugin.connection_status() {
            let connected = status.is_connected().await;
            let rt = elapsed_ms(started);
            let result = if connected {
                CheckResult::new(plugin_id, self.kind(), HealthStatus::Healthy, 1.0, rt)
            } else {
                CheckResult::failed(plugin_id, self.kind(), "plugin reports disconnected", rt)
            };
            return Ok(result.with_detail("method", "connection_flag"));
        }

        // 2. エンドポイントへの往復時間
        if let Some(endpoint) = plugin.http_endpoint() {
            let url = endpoint.endpoint_url();
            let response = self.context.http.get(&url).send().await;
            let rt = elapsed_ms(started);
            let result = match response {
                Ok(response) => {
                    let (status, score) = if rt > self.context.config.degraded_latency_ms {
                        (HealthStatus::Degraded, 0.5)
                    } else {
                        (HealthStatus::Healthy, 1.0)
                    };
                    CheckResult::new(plugin_id, self.kind(), status, score, rt)
                        .with_detail("http_status", response.status().as_u16())
                }
                Err(e) => CheckResult::failed(
                    plugin_id,
                    self.kind(),
                    format!("endpoint {} unreachable: {}", url, e),
                    rt,
                ),
            };
            return Ok(result
                .with_detail("method", "endpoint_latency")
                .with_detail("endpoint", url));
        }

        // 3. host:port への TCP 到達性
        if let Some(socket) = plugin.socket_endpoint() {
            let (host, port) = socket.host_port();
            let connect = TcpStream::connect((host.as_str(), port)).await;
            let rt = elapsed_ms(started);
            let result = match connect {
                Ok(_) => CheckResult::new(plugin_id, self.kind(), HealthStatus::Healthy, 1.0, rt),
                Err(e) => CheckResult::failed(
                    plugin_id,
                    self.kind(),
                    format!("{}:{} unreachable: {}", host, port, e),
                    rt,
                ),
            };
            return Ok(result
                .with_detail("method", "socket")
                .with_detail("address", format!("{}:{}", host, port)));
        }

        debug!("Plugin {} exposes no connectivity signal", plugin_id);
        Ok(
            CheckResult::new(plugin_id, self.kind(), HealthStatus::Healthy, 1.0, elapsed_ms(started))
                .with_detail("method", "none"),
        )
    }
}

/// アプリケーションプローブ
pub struct ApplicationProbe {
    context: Arc<ProbeContext>,
}

impl ApplicationProbe {
    pub fn new(context: Arc<ProbeContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl HealthProbe for ApplicationProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Application
    }

    async fn probe(&self, plugin_id: &str, plugin: &dyn MonitoredPlugin) -> Result<CheckResult> {
        let started = Instant::now();

        let (app_score, method, error, forced_unhealthy) =
            if let Some(checkable) = plugin.health_checkable() {
                match checkable.health_check().await {
                    Ok(()) => (1.0, "health_check", None, false),
                    Err(e) => (0.0, "health_check", Some(e.to_string()), true),
                }
            } else if let Some(metadata) = plugin.metadata_source() {
                match metadata.info().await {
                    Ok(_) => (1.0, "metadata", None, false),
                    Err(e) => (0.5, "metadata", Some(format!("metadata unavailable: {}", e)), false),
                }
            } else {
                (1.0, "none", None, false)
            };

        let usage = self.context.estimator.estimate(plugin_id);
        let resource_score = usage
            .map(|u| u.headroom_score())
            .unwrap_or(UNKNOWN_RESOURCE_SCORE);
        let score = clamp_unit(APPLICATION_WEIGHT * app_score + RESOURCE_WEIGHT * resource_score);

        let status = if forced_unhealthy {
            HealthStatus::Unhealthy
        } else {
            self.context.thresholds.classify(score)
        };

        let mut result = CheckResult::new(plugin_id, self.kind(), status, score, elapsed_ms(started))
            .with_detail("method", method)
            .with_detail("application_score", app_score)
            .with_detail("resource_score", resource_score)
            .with_detail("resource_estimated", usage.is_some());
        if let Some(error) = error {
            result = result.with_error(error);
        }
        Ok(result)
    }
}

/// データ品質プローブ
pub struct DataQualityProbe {
    context: Arc<ProbeContext>,
}

impl DataQualityProbe {
    pub fn new(context: Arc<ProbeContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl HealthProbe for DataQualityProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::DataQuality
    }

    async fn probe(&self, plugin_id: &str, plugin: &dyn MonitoredPlugin) -> Result<CheckResult> {
        let started = Instant::now();
        let mut scores = Vec::with_capacity(3);
        let mut result_details: Vec<(String, Value)> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        if let Some(source) = plugin.sample_source() {
            let score = match source.sample_data().await {
                Ok(sample) => completeness(&sample),
                Err(e) => {
                    result_details.push(("completeness_error".into(), e.to_string().into()));
                    errors.push(format!("sample_data failed: {}", e));
                    0.0
                }
            };
            result_details.push(("completeness".into(), score.into()));
            scores.push(score);
        }

        if let Some(source) = plugin.freshness_source() {
            let score = match source.last_update_time().await {
                Ok(updated_at) => {
                    let age = (Utc::now() - updated_at).num_milliseconds() as f64 / 1_000.0;
                    result_details.push(("age_secs".into(), age.into()));
                    freshness_score(age)
                }
                Err(e) => {
                    result_details.push(("timeliness_error".into(), e.to_string().into()));
                    errors.push(format!("last_update_time failed: {}", e));
                    0.0
                }
            };
            result_details.push(("timeliness".into(), score.into()));
            scores.push(score);
        }

        if let Some(source) = plugin.consistency_source() {
            let score = match source.validate_consistency().await {
                Ok(reported) => clamp_unit(reported),
                Err(e) => {
                    result_details.push(("consistency_error".into(), e.to_string().into()));
                    errors.push(format!("validate_consistency failed: {}", e));
                    0.0
                }
            };
            result_details.push(("consistency".into(), score.into()));
            scores.push(score);
        }

        let score = if scores.is_empty() {
            result_details.push(("method".into(), "none".into()));
            UNKNOWN_DATA_QUALITY_SCORE
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        let mut result = CheckResult::new(
            plugin_id,
            self.kind(),
            self.context.thresholds.classify(score),
            score,
            elapsed_ms(started),
        );
        result.details.extend(result_details);
        if !errors.is_empty() {
            result = result.with_error(errors.join("; "));
        }
        Ok(result)
    }
}

/// ペイロードの充足率（非 null フィールドの割合）
pub fn completeness(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Object(map) => {
            if map.is_empty() {
                return 0.0;
            }
            let present = map.values().filter(|v| !v.is_null()).count();
            present as f64 / map.len() as f64
        }
        Value::Array(items) => {
            if items.is_empty() {
                return 0.0;
            }
            items.iter().map(completeness).sum::<f64>() / items.len() as f64
        }
        _ => 1.0,
    }
}

/// 最終更新からの経過秒数に基づく鮮度スコア
///
/// 1時間以内は 1.0、24時間で 0.0 まで線形に減衰する。
pub fn freshness_score(age_secs: f64) -> f64 {
    if age_secs <= FRESH_SECS {
        1.0
    } else if age_secs >= STALE_SECS {
        0.0
    } else {
        1.0 - (age_secs - FRESH_SECS) / (STALE_SECS - FRESH_SECS)
    }
}

/// パフォーマンスプローブ
pub struct PerformanceProbe {
    context: Arc<ProbeContext>,
}

impl PerformanceProbe {
    pub fn new(context: Arc<ProbeContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl HealthProbe for PerformanceProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Performance
    }

    async fn probe(&self, plugin_id: &str, plugin: &dyn MonitoredPlugin) -> Result<CheckResult> {
        let started = Instant::now();
        let config = &self.context.config;

        let Some(metadata) = plugin.metadata_source() else {
            return Ok(CheckResult::new(
                plugin_id,
                self.kind(),
                self.context.thresholds.classify(UNKNOWN_PERFORMANCE_SCORE),
                UNKNOWN_PERFORMANCE_SCORE,
                elapsed_ms(started),
            )
            .with_detail("method", "none"));
        };

        // 応答時間のサンプリング
        let mut samples = Vec::with_capacity(config.performance_sample_calls);
        for _ in 0..config.performance_sample_calls {
            let call_started = Instant::now();
            metadata
                .info()
                .await
                .map_err(|e| Error::Probe(format!("timed metadata call failed: {}", e)))?;
            samples.push(elapsed_ms(call_started));
        }
        let mean_rt = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance =
            samples.iter().map(|s| (s - mean_rt).powi(2)).sum::<f64>() / samples.len() as f64;
        let response_score = (1.0 - mean_rt / config.degraded_latency_ms).max(0.0);

        // 固定時間のスループット計測
        let window = config.throughput_window();
        let throughput_started = Instant::now();
        let mut calls = 0usize;
        while throughput_started.elapsed() < window && calls < config.max_throughput_calls {
            metadata
                .info()
                .await
                .map_err(|e| Error::Probe(format!("throughput call failed: {}", e)))?;
            calls += 1;
        }
        let throughput_secs = throughput_started.elapsed().as_secs_f64().max(1e-3);
        let throughput_rps = calls as f64 / throughput_secs;
        let throughput_score = (throughput_rps / config.target_throughput_rps).min(1.0);

        let efficiency_score = self
            .context
            .estimator
            .estimate(plugin_id)
            .map(|u| u.efficiency_score())
            .unwrap_or(UNKNOWN_RESOURCE_SCORE);

        let score = clamp_unit((response_score + throughput_score + efficiency_score) / 3.0);

        Ok(CheckResult::new(
            plugin_id,
            self.kind(),
            self.context.thresholds.classify(score),
            score,
            mean_rt,
        )
        .with_detail("mean_response_ms", mean_rt)
        .with_detail("response_variance", variance)
        .with_detail("throughput_rps", throughput_rps)
        .with_detail("response_score", response_score)
        .with_detail("throughput_score", throughput_score)
        .with_detail("efficiency_score", efficiency_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::capabilities::{
        ConnectionStatus, ConsistencySource, FreshnessSource, HealthCheckable, HttpEndpoint,
        MetadataSource, NoResourceEstimate, ResourceUsage, SampleSource, SocketEndpoint,
    };
    use chrono::{DateTime, Duration};
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn context() -> Arc<ProbeContext> {
        let config = ProbeConfig {
            throughput_window_ms: 20,
            max_throughput_calls: 50,
            ..Default::default()
        };
        Arc::new(
            ProbeContext::new(config, StatusThresholds::default(), Arc::new(NoResourceEstimate))
                .unwrap(),
        )
    }

    struct Bare;
    impl MonitoredPlugin for Bare {}

    struct Disconnected;
    #[async_trait]
    impl ConnectionStatus for Disconnected {
        async fn is_connected(&self) -> bool {
            false
        }
    }
    impl MonitoredPlugin for Disconnected {
        fn connection_status(&self) -> Option<&dyn ConnectionStatus> {
            Some(self)
        }
    }

    struct BrokenApp;
    #[async_trait]
    impl HealthCheckable for BrokenApp {
        async fn health_check(&self) -> Result<()> {
            Err(Error::Plugin("database pool exhausted".into()))
        }
    }
    impl MonitoredPlugin for BrokenApp {
        fn health_checkable(&self) -> Option<&dyn HealthCheckable> {
            Some(self)
        }
    }

    struct DataPlugin {
        updated_at: DateTime<Utc>,
    }
    #[async_trait]
    impl SampleSource for DataPlugin {
        async fn sample_data(&self) -> Result<Value> {
            Ok(json!({"symbol": "ABC", "price": 10.5, "volume": null, "ts": 1}))
        }
    }
    #[async_trait]
    impl FreshnessSource for DataPlugin {
        async fn last_update_time(&self) -> Result<DateTime<Utc>> {
            Ok(self.updated_at)
        }
    }
    #[async_trait]
    impl ConsistencySource for DataPlugin {
        async fn validate_consistency(&self) -> Result<f64> {
            Ok(1.5)
        }
    }
    impl MonitoredPlugin for DataPlugin {
        fn sample_source(&self) -> Option<&dyn SampleSource> {
            Some(self)
        }
        fn freshness_source(&self) -> Option<&dyn FreshnessSource> {
            Some(self)
        }
        fn consistency_source(&self) -> Option<&dyn ConsistencySource> {
            Some(self)
        }
    }

    struct FastMetadata;
    #[async_trait]
    impl MetadataSource for FastMetadata {
        async fn info(&self) -> Result<HashMap<String, Value>> {
            Ok(HashMap::from([("name".to_string(), json!("fast"))]))
        }
    }
    impl MonitoredPlugin for FastMetadata {
        fn metadata_source(&self) -> Option<&dyn MetadataSource> {
            Some(self)
        }
    }

    struct FixedUsage;
    impl ResourceEstimator for FixedUsage {
        fn estimate(&self, _plugin_id: &str) -> Option<ResourceUsage> {
            Some(ResourceUsage {
                cpu_percent: 90.0,
                memory_percent: 95.0,
            })
        }
    }

    #[tokio::test]
    async fn test_connectivity_defaults_to_healthy_without_signal() {
        let probe = ConnectivityProbe::new(context());
        let result = probe.probe("p", &Bare).await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_connectivity_flag_disconnected() {
        let probe = ConnectivityProbe::new(context());
        let result = probe.probe("p", &Disconnected).await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_application_health_check_failure_is_unhealthy() {
        let probe = ApplicationProbe::new(context());
        let result = probe.probe("p", &BrokenApp).await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.unwrap().contains("pool exhausted"));
        assert!(result.score <= 0.3 + 1e-9);
    }

    #[tokio::test]
    async fn test_application_resource_pressure_lowers_score() {
        let ctx = Arc::new(
            ProbeContext::new(
                ProbeConfig::default(),
                StatusThresholds::default(),
                Arc::new(FixedUsage),
            )
            .unwrap(),
        );
        let probe = ApplicationProbe::new(ctx);
        let result = probe.probe("p", &FastMetadata).await.unwrap();
        // 0.7 * 1.0 + 0.3 * 0.05
        assert!((result.score - 0.715).abs() < 1e-9);
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_data_quality_defaults_to_unknown_penalty() {
        let probe = DataQualityProbe::new(context());
        let result = probe.probe("p", &Bare).await.unwrap();
        assert_eq!(result.score, UNKNOWN_DATA_QUALITY_SCORE);
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_data_quality_averages_sub_checks() {
        let plugin = DataPlugin {
            updated_at: Utc::now() - Duration::minutes(10),
        };
        let probe = DataQualityProbe::new(context());
        let result = probe.probe("p", &plugin).await.unwrap();
        // completeness 0.75, timeliness 1.0, consistency clamped to 1.0
        assert!((result.score - 2.75 / 3.0).abs() < 1e-9);
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_freshness_decay() {
        assert_eq!(freshness_score(0.0), 1.0);
        assert_eq!(freshness_score(3_600.0), 1.0);
        assert!((freshness_score(12.5 * 3_600.0) - 0.5).abs() < 1e-9);
        assert_eq!(freshness_score(24.0 * 3_600.0), 0.0);
        assert_eq!(freshness_score(48.0 * 3_600.0), 0.0);
    }

    #[test]
    fn test_completeness() {
        assert_eq!(completeness(&Value::Null), 0.0);
        assert_eq!(completeness(&json!({})), 0.0);
        assert_eq!(completeness(&json!({"a": 1, "b": null})), 0.5);
        assert_eq!(completeness(&json!([{"a": 1}, {"a": null}])), 0.5);
        assert_eq!(completeness(&json!("text")), 1.0);
    }

    #[tokio::test]
    async fn test_performance_with_fast_metadata() {
        let probe = PerformanceProbe::new(context());
        let result = probe.probe("p", &FastMetadata).await.unwrap();
        assert!(result.score > 0.5);
        assert!(result.details.contains_key("throughput_rps"));
        assert!(result.details.contains_key("response_variance"));
    }

    #[tokio::test]
    async fn test_performance_without_timed_operation() {
        let probe = PerformanceProbe::new(context());
        let result = probe.probe("p", &Bare).await.unwrap();
        assert_eq!(result.score, UNKNOWN_PERFORMANCE_SCORE);
    }

    struct HttpPlugin {
        url: String,
    }
    impl HttpEndpoint for HttpPlugin {
        fn endpoint_url(&self) -> String {
            self.url.clone()
        }
    }
    impl MonitoredPlugin for HttpPlugin {
        fn http_endpoint(&self) -> Option<&dyn HttpEndpoint> {
            Some(self)
        }
    }

    struct SocketPlugin {
        addr: SocketAddr,
    }
    impl SocketEndpoint for SocketPlugin {
        fn host_port(&self) -> (String, u16) {
            (self.addr.ip().to_string(), self.addr.port())
        }
    }
    impl MonitoredPlugin for SocketPlugin {
        fn socket_endpoint(&self) -> Option<&dyn SocketEndpoint> {
            Some(self)
        }
    }

    /// 指定の遅延後に 200 を返す最小の HTTP サーバー
    async fn spawn_http_server(delay: std::time::Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        addr
    }

    /// 接続を受け付けないアドレス
    async fn closed_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    fn context_with_latency_limit(degraded_latency_ms: f64) -> Arc<ProbeContext> {
        let config = ProbeConfig {
            degraded_latency_ms,
            ..Default::default()
        };
        Arc::new(
            ProbeContext::new(config, StatusThresholds::default(), Arc::new(NoResourceEstimate))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_connectivity_endpoint_reachable() {
        let addr = spawn_http_server(std::time::Duration::ZERO).await;
        let plugin = HttpPlugin {
            url: format!("http://{}/health", addr),
        };
        let probe = ConnectivityProbe::new(context());
        let result = probe.probe("p", &plugin).await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.details["method"], json!("endpoint_latency"));
        assert_eq!(result.details["http_status"], json!(200));
    }

    #[tokio::test]
    async fn test_connectivity_slow_endpoint_is_degraded() {
        let addr = spawn_http_server(std::time::Duration::from_millis(50)).await;
        let plugin = HttpPlugin {
            url: format!("http://{}/health", addr),
        };
        let probe = ConnectivityProbe::new(context_with_latency_limit(10.0));
        let result = probe.probe("p", &plugin).await.unwrap();
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.score, 0.5);
        assert!(result.response_time_ms > 10.0);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_connectivity_unreachable_endpoint_is_unhealthy() {
        let addr = closed_addr().await;
        let plugin = HttpPlugin {
            url: format!("http://{}/health", addr),
        };
        let probe = ConnectivityProbe::new(context());
        let result = probe.probe("p", &plugin).await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.score, 0.0);
        assert!(result.error.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_connectivity_socket_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let plugin = SocketPlugin {
            addr: listener.local_addr().unwrap(),
        };
        let probe = ConnectivityProbe::new(context());
        let result = probe.probe("p", &plugin).await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.details["method"], json!("socket"));
    }

    #[tokio::test]
    async fn test_connectivity_socket_unreachable_is_unhealthy() {
        let plugin = SocketPlugin {
            addr: closed_addr().await,
        };
        let probe = ConnectivityProbe::new(context());
        let result = probe.probe("p", &plugin).await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.score, 0.0);
        assert!(result.error.unwrap().contains("unreachable"));
    }

    struct FailingData;
    #[async_trait]
    impl SampleSource for FailingData {
        async fn sample_data(&self) -> Result<Value> {
            Err(Error::Plugin("sample endpoint 500".into()))
        }
    }
    #[async_trait]
    impl FreshnessSource for FailingData {
        async fn last_update_time(&self) -> Result<DateTime<Utc>> {
            Err(Error::Plugin("no update marker".into()))
        }
    }
    #[async_trait]
    impl ConsistencySource for FailingData {
        async fn validate_consistency(&self) -> Result<f64> {
            Ok(0.9)
        }
    }
    impl MonitoredPlugin for FailingData {
        fn sample_source(&self) -> Option<&dyn SampleSource> {
            Some(self)
        }
        fn freshness_source(&self) -> Option<&dyn FreshnessSource> {
            Some(self)
        }
        fn consistency_source(&self) -> Option<&dyn ConsistencySource> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn test_data_quality_failed_sub_checks_score_zero() {
        let probe = DataQualityProbe::new(context());
        let result = probe.probe("p", &FailingData).await.unwrap();
        // 0.0 + 0.0 + 0.9
        assert!((result.score - 0.3).abs() < 1e-9);
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.details["completeness"], json!(0.0));
        assert!(result.details.contains_key("completeness_error"));
        assert!(result.details.contains_key("timeliness_error"));
        let error = result.error.unwrap();
        assert!(error.contains("sample_data failed"));
        assert!(error.contains("last_update_time failed"));
    }

    struct FailingMetadata;
    #[async_trait]
    impl MetadataSource for FailingMetadata {
        async fn info(&self) -> Result<HashMap<String, Value>> {
            Err(Error::Plugin("metadata service offline".into()))
        }
    }
    impl MonitoredPlugin for FailingMetadata {
        fn metadata_source(&self) -> Option<&dyn MetadataSource> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn test_performance_fails_when_timed_operation_errors() {
        let probe = PerformanceProbe::new(context());
        let err = probe.probe("p", &FailingMetadata).await.unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
        assert!(err.to_string().contains("metadata service offline"));
    }
}
