//! Health Check Coordinator
//!
//! プラグインごとに4つのプローブを並行実行し、複合スコア・ステータス・
//! 履歴・失敗/復旧の記録を1つの単位として更新する。

use super::capabilities::{MonitoredPlugin, ResourceEstimator};
use super::probes::{default_probes, HealthProbe, ProbeContext};
use super::types::{clamp_unit, CheckKind, CheckResult, HealthStatus, HealthSummary, PluginHealthProfile};
use crate::config::{EngineConfig, HealthConfig, ProbeConfig};
use crate::error::{Error, Result};
use crate::events::{EventBus, ReliabilityEventType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

/// ヘルスチェックコーディネーター
pub struct HealthCheckCoordinator {
    config: HealthConfig,
    probe_config: ProbeConfig,
    probes: Vec<Arc<dyn HealthProbe>>,
    /// プラグインIDごとのプロファイル（唯一の所有者）
    profiles: RwLock<HashMap<String, PluginHealthProfile>>,
    /// 同時実行チェックサイクル数の制限（シャットダウン時にクローズ）
    permits: Arc<Semaphore>,
    events: EventBus,
}

impl HealthCheckCoordinator {
    /// 標準の4プローブでコーディネーターを作成
    pub fn new(
        config: &EngineConfig,
        estimator: Arc<dyn ResourceEstimator>,
        events: EventBus,
    ) -> Result<Self> {
        let context = Arc::new(ProbeContext::new(
            config.probes.clone(),
            config.health.thresholds.clone(),
            estimator,
        )?);
        Self::with_probes(config, default_probes(context), events)
    }

    /// 任意のプローブ集合でコーディネーターを作成
    pub fn with_probes(
        config: &EngineConfig,
        probes: Vec<Arc<dyn HealthProbe>>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.health.clone(),
            probe_config: config.probes.clone(),
            probes,
            profiles: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(config.health.max_concurrent_checks)),
            events,
        })
    }

    /// 全プローブを実行してプロファイルを更新
    ///
    /// 失敗・パニック・タイムアウトしたプローブは Unhealthy な結果に変換され、
    /// 他のプローブの結果は必ず記録される。スケジュール自体ができない場合は
    /// Unknown / スコア 0 のプロファイルを返す。
    pub async fn check_all(
        &self,
        plugin_id: &str,
        plugin: Arc<dyn MonitoredPlugin>,
    ) -> PluginHealthProfile {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                let error = Error::Aggregation("health check scheduling is closed".to_string());
                return self.mark_unknown(plugin_id, &error).await;
            }
        };

        let started = Instant::now();
        let handles: Vec<_> = self
            .probes
            .iter()
            .map(|probe| {
                let probe = Arc::clone(probe);
                let plugin = Arc::clone(&plugin);
                let id = plugin_id.to_string();
                let kind = probe.kind();
                let timeout = self.probe_config.timeout_for(kind);
                let handle = tokio::spawn(async move {
                    let probe_started = Instant::now();
                    match tokio::time::timeout(timeout, probe.probe(&id, plugin.as_ref())).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(e)) => {
                            warn!(
                                category = e.category(),
                                "{} probe failed for {}: {}",
                                kind,
                                id,
                                e
                            );
                            CheckResult::failed(&id, kind, e.to_string(), elapsed_ms(probe_started))
                        }
                        Err(_) => {
                            warn!("{} probe timed out for {} after {:?}", kind, id, timeout);
                            CheckResult::failed(
                                &id,
                                kind,
                                format!("{} probe timed out after {:?}", kind, timeout),
                                elapsed_ms(probe_started),
                            )
                        }
                    }
                });
                (kind, handle)
            })
            .collect();

        let joined =
            futures::future::join_all(handles.into_iter().map(|(kind, handle)| async move {
                (kind, handle.await)
            }))
            .await;
        drop(permit);

        let mut results = HashMap::with_capacity(joined.len());
        for (kind, outcome) in joined {
            let mut result = match outcome {
                Ok(result) => result,
                Err(join_error) => {
                    warn!("{} probe aborted for {}: {}", kind, plugin_id, join_error);
                    CheckResult::failed(
                        plugin_id,
                        kind,
                        format!("{} probe aborted: {}", kind, join_error),
                        0.0,
                    )
                }
            };
            result.kind = kind;
            results.insert(kind, result);
        }

        debug!(
            "Check cycle for {} finished in {:.1}ms",
            plugin_id,
            elapsed_ms(started)
        );
        self.apply_cycle(plugin_id, results).await
    }

    /// 1サイクルの結果をプロファイルへ一括反映
    async fn apply_cycle(
        &self,
        plugin_id: &str,
        results: HashMap<CheckKind, CheckResult>,
    ) -> PluginHealthProfile {
        let overall_score = aggregate_score(&self.config, &results);
        let status = self.config.thresholds.classify(overall_score);
        let now = Utc::now();

        let (snapshot, previous, recovered) = {
            let mut profiles = self.profiles.write().await;
            let profile = profiles
                .entry(plugin_id.to_string())
                .or_insert_with(|| PluginHealthProfile::new(plugin_id));
            let previous = profile.overall_status;

            profile.overall_score = overall_score;
            profile.overall_status = status;
            profile.last_check_time = Some(now);
            profile.checks = results;
            profile.historical_scores.push_back((now, overall_score));
            self.prune_history(profile, now);

            let mut recovered = false;
            if status.is_failure() {
                profile.failure_count += 1;
                profile.consecutive_failures += 1;
                profile.last_failure_time = Some(now);
                profile.recovery_time = None;
            } else {
                if profile.consecutive_failures > 0 {
                    profile.recovery_time = Some(now);
                    recovered = true;
                }
                profile.consecutive_failures = 0;
            }

            (profile.clone(), previous, recovered)
        };

        if previous != status {
            info!(
                "Plugin {} status changed: {} -> {} (score {:.3})",
                plugin_id, previous, status, overall_score
            );
            self.events.publish(
                ReliabilityEventType::StatusChanged {
                    plugin_id: plugin_id.to_string(),
                    from: previous,
                    to: status,
                },
                format!("{} is now {}", plugin_id, status),
            );
        }
        if recovered {
            info!("✅ Plugin {} recovered", plugin_id);
            self.events.publish(
                ReliabilityEventType::Recovered {
                    plugin_id: plugin_id.to_string(),
                },
                format!("{} recovered after a failure streak", plugin_id),
            );
        }

        snapshot
    }

    /// チェック不能としてプロファイルを Unknown にする
    ///
    /// 失敗カウンターと履歴スコアには触れない。
    async fn mark_unknown(&self, plugin_id: &str, error: &Error) -> PluginHealthProfile {
        warn!("Could not check plugin {}: {}", plugin_id, error);
        let now = Utc::now();
        let snapshot = {
            let mut profiles = self.profiles.write().await;
            let profile = profiles
                .entry(plugin_id.to_string())
                .or_insert_with(|| PluginHealthProfile::new(plugin_id));
            profile.overall_status = HealthStatus::Unknown;
            profile.overall_score = 0.0;
            profile.last_check_time = Some(now);
            profile.checks.clear();
            self.prune_history(profile, now);
            profile.clone()
        };

        self.events.publish(
            ReliabilityEventType::CheckSkipped {
                plugin_id: plugin_id.to_string(),
                reason: error.to_string(),
            },
            format!("{} could not be checked", plugin_id),
        );
        snapshot
    }

    fn prune_history(&self, profile: &mut PluginHealthProfile, now: DateTime<Utc>) {
        let cutoff = now - self.config.retention();
        while profile
            .historical_scores
            .front()
            .is_some_and(|(time, _)| *time < cutoff)
        {
            profile.historical_scores.pop_front();
        }
        while profile.historical_scores.len() > self.config.max_history_points {
            profile.historical_scores.pop_front();
        }
    }

    pub async fn get_profile(&self, plugin_id: &str) -> Option<PluginHealthProfile> {
        self.profiles.read().await.get(plugin_id).cloned()
    }

    /// Healthy なプラグインIDの一覧（ソート済み）
    pub async fn list_healthy(&self) -> Vec<String> {
        let profiles = self.profiles.read().await;
        let mut healthy: Vec<String> = profiles
            .values()
            .filter(|p| p.overall_status == HealthStatus::Healthy)
            .map(|p| p.plugin_id.clone())
            .collect();
        healthy.sort();
        healthy
    }

    /// 指定期間内のスコア推移
    pub async fn get_trend(
        &self,
        plugin_id: &str,
        window: chrono::Duration,
    ) -> Vec<(DateTime<Utc>, f64)> {
        let cutoff = Utc::now() - window;
        self.profiles
            .read()
            .await
            .get(plugin_id)
            .map(|profile| {
                profile
                    .historical_scores
                    .iter()
                    .filter(|(time, _)| *time >= cutoff)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn summary(&self) -> HealthSummary {
        let profiles = self.profiles.read().await;
        let mut summary = HealthSummary {
            total_plugins: profiles.len(),
            ..Default::default()
        };
        for profile in profiles.values() {
            match profile.overall_status {
                HealthStatus::Healthy => summary.healthy_plugins += 1,
                HealthStatus::Degraded => summary.degraded_plugins += 1,
                HealthStatus::Unhealthy => summary.unhealthy_plugins += 1,
                HealthStatus::Unknown => summary.unknown_plugins += 1,
            }
        }
        if !profiles.is_empty() {
            summary.average_score =
                profiles.values().map(|p| p.overall_score).sum::<f64>() / profiles.len() as f64;
        }
        summary
    }

    pub async fn remove_profile(&self, plugin_id: &str) -> bool {
        self.profiles.write().await.remove(plugin_id).is_some()
    }

    /// 新規チェックの受付を停止（以降のチェックは Unknown になる）
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

/// 重み付き複合スコア（欠けている種別は 0 として扱う）
pub fn aggregate_score(config: &HealthConfig, results: &HashMap<CheckKind, CheckResult>) -> f64 {
    let total: f64 = CheckKind::ALL
        .iter()
        .map(|kind| {
            let score = results.get(kind).map(|r| r.score).unwrap_or(0.0);
            config.weights.weight_for(*kind) * score
        })
        .sum();
    clamp_unit(total)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}
