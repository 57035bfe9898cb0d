//! Feature Recorder
//!
//! プラグインごとの観測履歴（上限付きリングバッファ）

use super::feature::FeatureVector;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// 観測履歴の記録器
///
/// 上限を超えたら直近の半分だけを残す。
pub struct FeatureRecorder {
    max_history: usize,
    histories: RwLock<HashMap<String, VecDeque<FeatureVector>>>,
}

impl FeatureRecorder {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(2),
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// 観測を追加
    pub async fn record(&self, observation: FeatureVector) {
        let mut histories = self.histories.write().await;
        let history = histories
            .entry(observation.plugin_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.max_history.min(64)));
        history.push_back(observation);

        if history.len() > self.max_history {
            let keep = self.max_history / 2;
            let drain_count = history.len() - keep;
            history.drain(0..drain_count);
            debug!(
                "Feature history trimmed to {} points after overflow",
                history.len()
            );
        }
    }

    /// プラグインの履歴（古い順）
    pub async fn history(&self, plugin_id: &str) -> Vec<FeatureVector> {
        self.histories
            .read()
            .await
            .get(plugin_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 直近 `limit` 件（古い順）
    pub async fn recent(&self, plugin_id: &str, limit: usize) -> Vec<FeatureVector> {
        self.histories
            .read()
            .await
            .get(plugin_id)
            .map(|h| {
                let skip = h.len().saturating_sub(limit);
                h.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub async fn len(&self, plugin_id: &str) -> usize {
        self.histories
            .read()
            .await
            .get(plugin_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub async fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.histories.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn remove(&self, plugin_id: &str) {
        self.histories.write().await.remove(plugin_id);
    }

    /// 全履歴を置き換え（スナップショット読み込み用）
    pub async fn replace_all(&self, histories: HashMap<String, Vec<FeatureVector>>) {
        let mut current = self.histories.write().await;
        current.clear();
        for (plugin_id, observations) in histories {
            let skip = observations.len().saturating_sub(self.max_history);
            current.insert(plugin_id, observations.into_iter().skip(skip).collect());
        }
    }

    pub async fn clear(&self) {
        self.histories.write().await.clear();
    }
}
