//! Reliability Events
//!
//! ステータス変化・復旧・選択・永続化などのイベント通知

use crate::health::HealthStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// イベント通知チャンネルの容量
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// 信頼性イベント
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: ReliabilityEventType,
    pub message: String,
}

/// イベントタイプ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReliabilityEventType {
    /// 全体ステータスの変化
    StatusChanged {
        plugin_id: String,
        from: HealthStatus,
        to: HealthStatus,
    },
    /// 連続失敗からの復旧
    Recovered { plugin_id: String },
    /// チェックを実行できなかった
    CheckSkipped { plugin_id: String, reason: String },
    /// ルーティング先の選択
    PluginSelected { plugin_id: String, explored: bool },
    /// スナップショット保存
    SnapshotSaved { path: PathBuf },
    /// スナップショット読み込み失敗（既定状態で継続）
    SnapshotLoadFailed { reason: String },
}

impl ReliabilityEvent {
    pub fn new(event_type: ReliabilityEventType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            message: message.into(),
        }
    }
}

/// イベント送信側
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ReliabilityEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReliabilityEvent> {
        self.sender.subscribe()
    }

    /// イベントを送信（購読者がいなくても失敗扱いにしない）
    pub fn publish(&self, event_type: ReliabilityEventType, message: impl Into<String>) {
        let event = ReliabilityEvent::new(event_type, message);
        if self.sender.send(event).is_err() {
            debug!("No subscribers for reliability event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(
            ReliabilityEventType::Recovered {
                plugin_id: "alpha".into(),
            },
            "alpha recovered",
        );

        let event = receiver.recv().await.unwrap();
        assert_eq!(
            event.event_type,
            ReliabilityEventType::Recovered {
                plugin_id: "alpha".into()
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(
            ReliabilityEventType::SnapshotLoadFailed {
                reason: "missing".into(),
            },
            "load failed",
        );
    }
}
