//! Multi-Armed Bandit
//!
//! ε-greedy による探索と活用のバランス。アーム = プラグインID。

use super::scoring::{interval_around, mean, std_dev};
use super::types::{ModelKind, PredictionResult, NEUTRAL_SCORE};
use super::ReliabilityModel;
use crate::config::BanditConfig;
use crate::health::clamp_unit;
use crate::telemetry::FeatureVector;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

const MAX_CONFIDENCE: f64 = 0.95;
const CONFIDENCE_PSEUDO_COUNT: f64 = 5.0;

/// バンディットの内部状態
#[derive(Debug, Clone, PartialEq)]
pub struct BanditState {
    /// アームごとの報酬履歴
    pub rewards: HashMap<String, VecDeque<f64>>,
    /// アームごとの選択回数
    pub plays: HashMap<String, u64>,
    pub epsilon: f64,
    pub total_plays: u64,
}

impl BanditState {
    pub fn new(epsilon: f64) -> Self {
        Self {
            rewards: HashMap::new(),
            plays: HashMap::new(),
            epsilon,
            total_plays: 0,
        }
    }

    /// 履歴のないアームは中立値
    pub fn arm_mean(&self, arm: &str) -> f64 {
        match self.rewards.get(arm) {
            Some(history) if !history.is_empty() => {
                history.iter().sum::<f64>() / history.len() as f64
            }
            _ => NEUTRAL_SCORE,
        }
    }
}

/// アーム選択の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmSelection {
    pub arm: String,
    /// 探索（ランダム選択）だったか
    pub explored: bool,
}

/// アームごとの統計
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmStatistics {
    pub arm: String,
    pub mean_reward: f64,
    pub reward_count: usize,
    pub plays: u64,
}

/// ε-greedy 多腕バンディット
pub struct MultiArmedBandit {
    config: BanditConfig,
    horizon_secs: u64,
    state: Mutex<BanditState>,
}

impl MultiArmedBandit {
    pub fn new(config: BanditConfig, horizon_secs: u64) -> Self {
        let state = BanditState::new(config.initial_epsilon);
        Self {
            config,
            horizon_secs,
            state: Mutex::new(state),
        }
    }

    /// 候補の中からアームを選択（候補が空なら None）
    pub async fn select_arm(&self, candidates: &[String]) -> Option<ArmSelection> {
        if candidates.is_empty() {
            return None;
        }

        let state = self.state.lock().await;
        let mut rng = rand::thread_rng();

        if rng.gen::<f64>() < state.epsilon {
            let arm = candidates[rng.gen_range(0..candidates.len())].clone();
            debug!("Bandit exploring: selected {}", arm);
            return Some(ArmSelection {
                arm,
                explored: true,
            });
        }

        // 同点は先頭の候補を優先
        let mut best = &candidates[0];
        let mut best_mean = state.arm_mean(best);
        for candidate in candidates.iter().skip(1) {
            let candidate_mean = state.arm_mean(candidate);
            if candidate_mean > best_mean {
                best = candidate;
                best_mean = candidate_mean;
            }
        }

        debug!("Bandit exploiting: selected {} (mean {:.3})", best, best_mean);
        Some(ArmSelection {
            arm: best.clone(),
            explored: false,
        })
    }

    /// 報酬を記録し、ε を減衰させる
    pub async fn update_reward(&self, arm: &str, reward: f64) {
        let mut state = self.state.lock().await;
        let history = state.rewards.entry(arm.to_string()).or_default();
        history.push_back(clamp_unit(reward));
        self.trim_history(history);

        *state.plays.entry(arm.to_string()).or_insert(0) += 1;
        state.total_plays += 1;
        state.epsilon *= self.config.epsilon_decay;
    }

    pub async fn arm_mean(&self, arm: &str) -> f64 {
        self.state.lock().await.arm_mean(arm)
    }

    pub async fn epsilon(&self) -> f64 {
        self.state.lock().await.epsilon
    }

    /// アームごとの統計（ID順）
    pub async fn statistics(&self) -> Vec<ArmStatistics> {
        let state = self.state.lock().await;
        let mut arms: Vec<&String> = state.rewards.keys().chain(state.plays.keys()).collect();
        arms.sort();
        arms.dedup();

        arms.into_iter()
            .map(|arm| ArmStatistics {
                arm: arm.clone(),
                mean_reward: state.arm_mean(arm),
                reward_count: state.rewards.get(arm).map(|h| h.len()).unwrap_or(0),
                plays: state.plays.get(arm).copied().unwrap_or(0),
            })
            .collect()
    }

    pub async fn snapshot(&self) -> BanditState {
        self.state.lock().await.clone()
    }

    /// 復元する状態にも記録時と同じ丸め・上限を適用する
    pub async fn restore(&self, mut state: BanditState) {
        for history in state.rewards.values_mut() {
            for reward in history.iter_mut() {
                *reward = clamp_unit(*reward);
            }
            self.trim_history(history);
        }
        state.epsilon = clamp_unit(state.epsilon);
        *self.state.lock().await = state;
    }

    fn trim_history(&self, history: &mut VecDeque<f64>) {
        if history.len() > self.config.max_history {
            let excess = history.len().saturating_sub(self.config.trim_to);
            history.drain(..excess);
        }
    }

    pub async fn reset(&self) {
        *self.state.lock().await = BanditState::new(self.config.initial_epsilon);
    }

    pub async fn remove_arm(&self, arm: &str) {
        let mut state = self.state.lock().await;
        state.rewards.remove(arm);
        state.plays.remove(arm);
    }
}

#[async_trait]
impl ReliabilityModel for MultiArmedBandit {
    fn kind(&self) -> ModelKind {
        ModelKind::Bandit
    }

    async fn predict(&self, plugin_id: &str, _history: &[FeatureVector]) -> PredictionResult {
        let state = self.state.lock().await;
        let rewards: Vec<f64> = state
            .rewards
            .get(plugin_id)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();
        drop(state);

        if rewards.is_empty() {
            return PredictionResult::neutral(plugin_id, self.kind(), self.horizon_secs);
        }

        let n = rewards.len() as f64;
        let average = mean(&rewards);
        PredictionResult::new(
            plugin_id,
            self.kind(),
            average,
            interval_around(average, std_dev(&rewards) / n.sqrt()),
            (n / (n + CONFIDENCE_PSEUDO_COUNT)).min(MAX_CONFIDENCE),
            self.horizon_secs,
        )
        .with_feature_importance(HashMap::from([("reward_history".to_string(), 1.0)]))
    }
}
