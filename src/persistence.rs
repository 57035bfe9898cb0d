//! Snapshot Persistence
//!
//! バンディット状態・ベイズ事前分布・縮約した観測履歴の保存と復元。
//! 保存形式はバージョン付き JSON で、メモリ上の型とは独立している。

use crate::error::{Error, Result};
use crate::prediction::{BanditState, BayesianPrior};
use crate::telemetry::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// スナップショット形式のバージョン
pub const SNAPSHOT_VERSION: u32 = 1;

/// エンジン状態のスナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub bandit: BanditSnapshot,
    #[serde(default)]
    pub priors: BTreeMap<String, PriorSnapshot>,
    #[serde(default)]
    pub features: BTreeMap<String, Vec<FeatureSnapshot>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditSnapshot {
    pub epsilon: f64,
    pub total_plays: u64,
    #[serde(default)]
    pub arms: BTreeMap<String, ArmSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmSnapshot {
    #[serde(default)]
    pub rewards: Vec<f64>,
    #[serde(default)]
    pub plays: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorSnapshot {
    pub alpha: f64,
    pub beta: f64,
    pub initial_alpha: f64,
    pub initial_beta: f64,
}

/// 保存対象の特徴量のみを持つ観測
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub timestamp: DateTime<Utc>,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub failure_count: u64,
    pub data_quality_score: f64,
}

impl EngineSnapshot {
    /// `features` は各プラグインの直近 `persisted_points` 件に切り詰める
    pub fn capture(
        bandit: &BanditState,
        priors: &HashMap<String, BayesianPrior>,
        features: &HashMap<String, Vec<FeatureVector>>,
        persisted_points: usize,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            bandit: BanditSnapshot::from(bandit),
            priors: priors
                .iter()
                .map(|(id, prior)| (id.clone(), PriorSnapshot::from(prior)))
                .collect(),
            features: features
                .iter()
                .map(|(id, history)| {
                    let skip = history.len().saturating_sub(persisted_points);
                    (
                        id.clone(),
                        history.iter().skip(skip).map(FeatureSnapshot::from).collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn bandit_state(&self) -> BanditState {
        let mut state = BanditState::new(self.bandit.epsilon);
        state.total_plays = self.bandit.total_plays;
        for (arm, snapshot) in &self.bandit.arms {
            state
                .rewards
                .insert(arm.clone(), snapshot.rewards.iter().copied().collect());
            state.plays.insert(arm.clone(), snapshot.plays);
        }
        state
    }

    pub fn bayesian_priors(&self) -> HashMap<String, BayesianPrior> {
        self.priors
            .iter()
            .map(|(id, p)| {
                (
                    id.clone(),
                    BayesianPrior::restore(p.alpha, p.beta, p.initial_alpha, p.initial_beta),
                )
            })
            .collect()
    }

    pub fn feature_histories(&self) -> HashMap<String, Vec<FeatureVector>> {
        self.features
            .iter()
            .map(|(id, history)| {
                (
                    id.clone(),
                    history.iter().map(|f| f.to_feature_vector(id)).collect(),
                )
            })
            .collect()
    }

    /// アームごとの平均報酬
    pub fn arm_means(&self) -> BTreeMap<String, f64> {
        let state = self.bandit_state();
        self.bandit
            .arms
            .keys()
            .map(|arm| (arm.clone(), state.arm_mean(arm)))
            .collect()
    }

    /// プラグインごとの事後平均
    pub fn posterior_means(&self) -> BTreeMap<String, f64> {
        self.priors
            .iter()
            .map(|(id, p)| (id.clone(), p.alpha / (p.alpha + p.beta)))
            .collect()
    }
}

impl From<&BanditState> for BanditSnapshot {
    fn from(state: &BanditState) -> Self {
        let mut arms: BTreeMap<String, ArmSnapshot> = BTreeMap::new();
        for (arm, rewards) in &state.rewards {
            arms.entry(arm.clone()).or_default().rewards = rewards.iter().copied().collect();
        }
        for (arm, plays) in &state.plays {
            arms.entry(arm.clone()).or_default().plays = *plays;
        }
        Self {
            epsilon: state.epsilon,
            total_plays: state.total_plays,
            arms,
        }
    }
}

impl From<&BayesianPrior> for PriorSnapshot {
    fn from(prior: &BayesianPrior) -> Self {
        let (initial_alpha, initial_beta) = prior.initial();
        Self {
            alpha: prior.alpha,
            beta: prior.beta,
            initial_alpha,
            initial_beta,
        }
    }
}

impl From<&FeatureVector> for FeatureSnapshot {
    fn from(vector: &FeatureVector) -> Self {
        Self {
            timestamp: vector.timestamp,
            success_rate: vector.success_rate,
            avg_response_time: vector.avg_response_time,
            failure_count: vector.failure_count,
            data_quality_score: vector.data_quality_score,
        }
    }
}

impl FeatureSnapshot {
    /// 保存されていない特徴量は既定値になる
    pub fn to_feature_vector(&self, plugin_id: &str) -> FeatureVector {
        let mut vector = FeatureVector::at(plugin_id, self.timestamp);
        vector.success_rate = self.success_rate;
        vector.avg_response_time = self.avg_response_time;
        vector.failure_count = self.failure_count;
        vector.data_quality_score = self.data_quality_score;
        vector.sanitized()
    }
}

/// スナップショットを書き出す（一時ファイル + rename、タイムアウト付き）
pub async fn save_snapshot(path: &Path, snapshot: &EngineSnapshot, timeout: Duration) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let temp_path = temp_path_for(path);

    let write = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok::<(), Error>(())
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => {
            info!("Snapshot saved to {} ({} bytes)", path.display(), json.len());
            Ok(())
        }
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(Error::Persistence(format!(
                "failed to write snapshot {}: {}",
                path.display(),
                e
            )))
        }
        Err(_) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(Error::Timeout(format!(
                "snapshot save to {} exceeded {:?}",
                path.display(),
                timeout
            )))
        }
    }
}

/// スナップショットを読み込む（バージョン不一致はエラー）
pub async fn load_snapshot(path: &Path) -> Result<EngineSnapshot> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        Error::Persistence(format!("failed to read snapshot {}: {}", path.display(), e))
    })?;
    let snapshot: EngineSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
        Error::Persistence(format!("failed to parse snapshot {}: {}", path.display(), e))
    })?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::Persistence(format!(
            "unsupported snapshot version {} (expected {})",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }

    debug!(
        "Loaded snapshot from {}: {} arms, {} priors, {} feature histories",
        path.display(),
        snapshot.bandit.arms.len(),
        snapshot.priors.len(),
        snapshot.features.len()
    );
    Ok(snapshot)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{}.tmp", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> EngineSnapshot {
        let mut bandit = BanditState::new(0.05);
        bandit.rewards.insert("a".to_string(), vec![0.9, 0.7].into());
        bandit.plays.insert("a".to_string(), 2);
        bandit.total_plays = 2;

        let mut prior = BayesianPrior::new(1.0, 1.0);
        prior.update(4.0, 1.0);
        let priors = HashMap::from([("a".to_string(), prior)]);

        let history: Vec<_> = (0..150)
            .map(|i| {
                let mut vector = FeatureVector::new("a");
                vector.success_rate = if i % 2 == 0 { 1.0 } else { 0.9 };
                vector.network_latency = 12.0;
                vector
            })
            .collect();
        let features = HashMap::from([("a".to_string(), history)]);

        EngineSnapshot::capture(&bandit, &priors, &features, 100)
    }

    #[test]
    fn test_capture_reduces_features() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.features["a"].len(), 100);

        let restored = snapshot.feature_histories();
        // 保存しない特徴量は既定値
        assert_eq!(restored["a"][0].network_latency, 0.0);
        assert_eq!(restored["a"][0].plugin_id, "a");
    }

    #[test]
    fn test_state_conversions() {
        let snapshot = sample_snapshot();
        let state = snapshot.bandit_state();
        assert_eq!(state.epsilon, 0.05);
        assert!((state.arm_mean("a") - 0.8).abs() < 1e-12);
        assert_eq!(state.plays["a"], 2);

        let priors = snapshot.bayesian_priors();
        assert_eq!(priors["a"].alpha, 5.0);
        assert_eq!(priors["a"].initial(), (1.0, 1.0));
        assert!((snapshot.posterior_means()["a"] - 5.0 / 7.0).abs() < 1e-12);
        assert!((snapshot.arm_means()["a"] - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        let snapshot = sample_snapshot();

        save_snapshot(&path, &snapshot, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!temp_path_for(&path).exists());

        let loaded = load_snapshot(&path).await.unwrap();
        assert_eq!(loaded.arm_means(), snapshot.arm_means());
        assert_eq!(loaded.posterior_means(), snapshot.posterior_means());
        assert_eq!(loaded.bandit.total_plays, 2);
        assert_eq!(loaded.features["a"].len(), 100);
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot = sample_snapshot();
        snapshot.version = 99;
        tokio::fs::write(&path, serde_json::to_vec(&snapshot).unwrap())
            .await
            .unwrap();

        let err = load_snapshot(&path).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[tokio::test]
    async fn test_load_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_snapshot(&missing).await.is_err());

        let corrupt = dir.path().join("corrupt.json");
        tokio::fs::write(&corrupt, b"{not json").await.unwrap();
        assert!(matches!(
            load_snapshot(&corrupt).await.unwrap_err(),
            Error::Persistence(_)
        ));
    }
}
