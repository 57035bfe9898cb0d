//! Selection Policy
//!
//! 候補プラグインの中からルーティング先を選ぶ（バンディットに委譲）

use crate::events::{EventBus, ReliabilityEventType};
use crate::prediction::MultiArmedBandit;
use std::sync::Arc;
use tracing::info;

pub struct SelectionPolicy {
    bandit: Arc<MultiArmedBandit>,
    events: EventBus,
}

impl SelectionPolicy {
    pub fn new(bandit: Arc<MultiArmedBandit>, events: EventBus) -> Self {
        Self { bandit, events }
    }

    /// 候補が空なら None
    pub async fn select_plugin(&self, candidate_ids: &[String]) -> Option<String> {
        let selection = self.bandit.select_arm(candidate_ids).await?;

        info!(
            "Selected plugin {} from {} candidates (explored: {})",
            selection.arm,
            candidate_ids.len(),
            selection.explored
        );
        self.events.publish(
            ReliabilityEventType::PluginSelected {
                plugin_id: selection.arm.clone(),
                explored: selection.explored,
            },
            format!("Plugin {} selected", selection.arm),
        );

        Some(selection.arm)
    }

    /// 呼び出し結果の報酬を記録（0.0-1.0 に丸める）
    pub async fn record_outcome(&self, plugin_id: &str, reward: f64) {
        self.bandit.update_reward(plugin_id, reward).await;
    }
}
