//! Reliability Engine
//!
//! ヘルスチェック・観測履歴・予測モデル・選択ポリシー・永続化を
//! 1つのインスタンスにまとめたファサード

use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{EventBus, ReliabilityEvent, ReliabilityEventType};
use crate::health::{
    HealthCheckCoordinator, HealthProbe, HealthStatus, HealthSummary, MonitoredPlugin,
    NoResourceEstimate, PluginHealthProfile, ResourceEstimator,
};
use crate::persistence::{load_snapshot, save_snapshot, EngineSnapshot};
use crate::prediction::{ArmStatistics, ModelKind, ModelSuite, PredictionResult};
use crate::selection::SelectionPolicy;
use crate::telemetry::{FeatureRecorder, FeatureVector};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 信頼性エンジン
pub struct ReliabilityEngine {
    config: EngineConfig,
    coordinator: HealthCheckCoordinator,
    recorder: FeatureRecorder,
    models: ModelSuite,
    selection: SelectionPolicy,
    estimator: Arc<dyn ResourceEstimator>,
    /// 定期監視対象のプラグイン
    plugins: RwLock<HashMap<String, Arc<dyn MonitoredPlugin>>>,
    events: EventBus,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl ReliabilityEngine {
    /// 標準プローブ・リソース推定なしで作成
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_estimator(config, Arc::new(NoResourceEstimate))
    }

    /// リソース推定器を指定して作成
    pub fn with_estimator(config: EngineConfig, estimator: Arc<dyn ResourceEstimator>) -> Result<Self> {
        let events = EventBus::new();
        let coordinator = HealthCheckCoordinator::new(&config, Arc::clone(&estimator), events.clone())?;
        Ok(Self::assemble(config, coordinator, estimator, events))
    }

    /// 任意のプローブ集合で作成
    pub fn with_probes(config: EngineConfig, probes: Vec<Arc<dyn HealthProbe>>) -> Result<Self> {
        let events = EventBus::new();
        let coordinator = HealthCheckCoordinator::with_probes(&config, probes, events.clone())?;
        Ok(Self::assemble(
            config,
            coordinator,
            Arc::new(NoResourceEstimate),
            events,
        ))
    }

    fn assemble(
        config: EngineConfig,
        coordinator: HealthCheckCoordinator,
        estimator: Arc<dyn ResourceEstimator>,
        events: EventBus,
    ) -> Self {
        let models = ModelSuite::new(&config);
        let selection = SelectionPolicy::new(models.bandit(), events.clone());
        info!("✅ Reliability engine initialized");

        Self {
            recorder: FeatureRecorder::new(config.features.max_history),
            coordinator,
            models,
            selection,
            estimator,
            plugins: RwLock::new(HashMap::new()),
            events,
            cancel: CancellationToken::new(),
            monitor: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- ヘルスチェック ----

    /// 全プローブを実行し、結果を観測履歴にも記録する
    pub async fn check_all(
        &self,
        plugin_id: &str,
        plugin: Arc<dyn MonitoredPlugin>,
    ) -> PluginHealthProfile {
        let profile = self.coordinator.check_all(plugin_id, plugin).await;

        // チェックできなかったサイクルは観測として扱わない
        if self.config.features.record_from_health_checks
            && profile.overall_status != HealthStatus::Unknown
        {
            let usage = self.estimator.estimate(plugin_id);
            let observation = FeatureVector::from_profile(&profile, usage);
            self.record_observation(plugin_id, observation).await;
        }

        profile
    }

    pub async fn register_plugin(&self, plugin_id: impl Into<String>, plugin: Arc<dyn MonitoredPlugin>) {
        let plugin_id = plugin_id.into();
        info!("Registered plugin for monitoring: {}", plugin_id);
        self.plugins.write().await.insert(plugin_id, plugin);
    }

    /// 登録解除し、プロファイル・観測履歴・学習状態も破棄する
    pub async fn unregister_plugin(&self, plugin_id: &str) -> bool {
        let removed = self.plugins.write().await.remove(plugin_id).is_some();
        self.coordinator.remove_profile(plugin_id).await;
        self.recorder.remove(plugin_id).await;
        self.models.forget(plugin_id).await;
        if removed {
            info!("Unregistered plugin: {}", plugin_id);
        }
        removed
    }

    /// 登録済みプラグインを並行してチェック（ID順）
    pub async fn check_registered(&self) -> Vec<PluginHealthProfile> {
        let mut plugins: Vec<(String, Arc<dyn MonitoredPlugin>)> = self
            .plugins
            .read()
            .await
            .iter()
            .map(|(id, plugin)| (id.clone(), Arc::clone(plugin)))
            .collect();
        plugins.sort_by(|a, b| a.0.cmp(&b.0));

        join_all(
            plugins
                .into_iter()
                .map(|(id, plugin)| async move { self.check_all(&id, plugin).await }),
        )
        .await
    }

    /// 定期監視を開始（既に実行中なら何もしない）
    pub async fn start_monitoring(self: &Arc<Self>) {
        let mut monitor = self.monitor.lock().await;
        if monitor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Monitoring loop is already running");
            return;
        }

        let engine = Arc::clone(self);
        let cancel = self.cancel.child_token();
        let period = self.config.monitoring.interval();
        info!("Starting health monitoring every {:?}", period);

        *monitor = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Health monitoring stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let profiles = engine.check_registered().await;
                        debug!("Monitoring cycle checked {} plugins", profiles.len());
                    }
                }
            }
        }));
    }

    /// 監視を停止し、新規チェックを閉じ、設定があれば状態を保存する
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down reliability engine");
        self.cancel.cancel();
        if let Some(handle) = self.monitor.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Monitoring task ended abnormally: {}", e);
            }
        }
        self.coordinator.close();

        match self.config.persistence.snapshot_path.clone() {
            Some(path) => self.save(&path).await,
            None => Ok(()),
        }
    }

    // ---- 観測と予測 ----

    /// 観測を記録し、状態を持つモデルに反映する
    pub async fn record_observation(&self, plugin_id: &str, observation: FeatureVector) {
        let mut observation = observation.sanitized();
        observation.plugin_id = plugin_id.to_string();
        self.models.observe(&observation).await;
        self.recorder.record(observation).await;
    }

    pub async fn predict(&self, plugin_id: &str, model: ModelKind) -> PredictionResult {
        let history = self.recorder.history(plugin_id).await;
        self.models.predict(model, plugin_id, &history).await
    }

    pub async fn predict_ensemble(&self, plugin_id: &str) -> PredictionResult {
        self.predict(plugin_id, ModelKind::Ensemble).await
    }

    /// 特徴量とコンポジットスコアの相関（診断用）
    pub async fn feature_importance(&self, plugin_id: &str) -> HashMap<String, f64> {
        let history = self.recorder.history(plugin_id).await;
        self.models.feature_importance(&history)
    }

    // ---- 選択 ----

    pub async fn select_plugin(&self, candidate_ids: &[String]) -> Option<String> {
        self.selection.select_plugin(candidate_ids).await
    }

    pub async fn record_outcome(&self, plugin_id: &str, reward: f64) {
        self.selection.record_outcome(plugin_id, reward).await;
    }

    pub async fn arm_statistics(&self) -> Vec<ArmStatistics> {
        self.models.bandit().statistics().await
    }

    // ---- 参照 ----

    pub async fn get_profile(&self, plugin_id: &str) -> Option<PluginHealthProfile> {
        self.coordinator.get_profile(plugin_id).await
    }

    pub async fn list_healthy(&self) -> Vec<String> {
        self.coordinator.list_healthy().await
    }

    pub async fn get_trend(
        &self,
        plugin_id: &str,
        window: chrono::Duration,
    ) -> Vec<(DateTime<Utc>, f64)> {
        self.coordinator.get_trend(plugin_id, window).await
    }

    pub async fn health_summary(&self) -> HealthSummary {
        self.coordinator.summary().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReliabilityEvent> {
        self.events.subscribe()
    }

    // ---- 永続化 ----

    pub async fn snapshot(&self) -> EngineSnapshot {
        let mut features = HashMap::new();
        for plugin_id in self.recorder.plugin_ids().await {
            let history = self
                .recorder
                .recent(&plugin_id, self.config.features.persisted_points)
                .await;
            features.insert(plugin_id, history);
        }

        EngineSnapshot::capture(
            &self.models.bandit().snapshot().await,
            &self.models.bayesian().export().await,
            &features,
            self.config.features.persisted_points,
        )
    }

    /// バンディット・事前分布・観測履歴を保存
    pub async fn save(&self, dest: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        match save_snapshot(dest, &snapshot, self.config.persistence.save_timeout()).await {
            Ok(()) => {
                self.events.publish(
                    ReliabilityEventType::SnapshotSaved {
                        path: dest.to_path_buf(),
                    },
                    format!("Snapshot saved to {}", dest.display()),
                );
                Ok(())
            }
            Err(e) => {
                error!(category = e.category(), "Failed to save snapshot: {}", e);
                Err(e)
            }
        }
    }

    /// 保存済み状態を読み込む
    ///
    /// 失敗しても致命的ではない。状態は既定値に戻り、エラーは情報として返す。
    pub async fn load(&self, src: &Path) -> Result<()> {
        match load_snapshot(src).await {
            Ok(snapshot) => {
                self.models.bandit().restore(snapshot.bandit_state()).await;
                self.models.bayesian().restore(snapshot.bayesian_priors()).await;
                self.recorder.replace_all(snapshot.feature_histories()).await;
                info!(
                    "Restored reliability state from {} ({} arms, {} priors)",
                    src.display(),
                    snapshot.bandit.arms.len(),
                    snapshot.priors.len()
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    category = e.category(),
                    "Snapshot load failed, continuing with default state: {}",
                    e
                );
                self.models.reset().await;
                self.recorder.clear().await;
                self.events.publish(
                    ReliabilityEventType::SnapshotLoadFailed {
                        reason: e.to_string(),
                    },
                    format!("Could not load {}", src.display()),
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckKind, CheckResult};
    use async_trait::async_trait;

    struct Bare;
    impl MonitoredPlugin for Bare {}

    struct FixedProbe {
        kind: CheckKind,
        score: f64,
    }

    #[async_trait]
    impl HealthProbe for FixedProbe {
        fn kind(&self) -> CheckKind {
            self.kind
        }

        async fn probe(&self, plugin_id: &str, _plugin: &dyn MonitoredPlugin) -> Result<CheckResult> {
            let status = if self.score >= 0.8 {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            Ok(CheckResult::new(plugin_id, self.kind, status, self.score, 10.0))
        }
    }

    fn engine(score: f64) -> ReliabilityEngine {
        let probes: Vec<Arc<dyn HealthProbe>> = CheckKind::ALL
            .iter()
            .map(|kind| Arc::new(FixedProbe { kind: *kind, score }) as Arc<dyn HealthProbe>)
            .collect();
        ReliabilityEngine::with_probes(EngineConfig::default(), probes).unwrap()
    }

    #[tokio::test]
    async fn test_check_all_records_observation() {
        let engine = engine(1.0);
        let profile = engine.check_all("p", Arc::new(Bare)).await;
        assert_eq!(profile.overall_status, HealthStatus::Healthy);

        assert_eq!(engine.recorder.len("p").await, 1);
        let history = engine.recorder.history("p").await;
        assert_eq!(history[0].success_rate, 1.0);
        // success_rate 1.0 は事後分布を成功側に更新する
        assert!(engine.models.bayesian().posterior_mean("p").await > 0.5);
    }

    #[tokio::test]
    async fn test_closed_engine_does_not_record() {
        let engine = engine(1.0);
        engine.shutdown().await.unwrap();
        let profile = engine.check_all("p", Arc::new(Bare)).await;
        assert_eq!(profile.overall_status, HealthStatus::Unknown);
        assert_eq!(engine.recorder.len("p").await, 0);
    }

    #[tokio::test]
    async fn test_register_and_check_registered() {
        let engine = engine(1.0);
        engine.register_plugin("b", Arc::new(Bare)).await;
        engine.register_plugin("a", Arc::new(Bare)).await;

        let profiles = engine.check_registered().await;
        let ids: Vec<_> = profiles.iter().map(|p| p.plugin_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(engine.list_healthy().await, vec!["a", "b"]);

        assert!(engine.unregister_plugin("a").await);
        assert!(engine.get_profile("a").await.is_none());
        assert!(!engine.unregister_plugin("a").await);
        assert_eq!(engine.health_summary().await.total_plugins, 1);
    }

    #[tokio::test]
    async fn test_monitoring_runs_until_shutdown() {
        let mut config = EngineConfig::default();
        config.monitoring.interval_secs = 1;
        let probes: Vec<Arc<dyn HealthProbe>> = CheckKind::ALL
            .iter()
            .map(|kind| Arc::new(FixedProbe { kind: *kind, score: 1.0 }) as Arc<dyn HealthProbe>)
            .collect();
        let engine = Arc::new(ReliabilityEngine::with_probes(config, probes).unwrap());
        engine.register_plugin("p", Arc::new(Bare)).await;

        engine.start_monitoring().await;
        // 最初の tick は即時
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(engine.get_profile("p").await.is_some());

        engine.shutdown().await.unwrap();
        assert!(engine.monitor.lock().await.is_none());
    }
}
