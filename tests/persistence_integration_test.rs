//! スナップショット保存・復元の統合テスト

use plugin_reliability::persistence::{load_snapshot, SNAPSHOT_VERSION};
use plugin_reliability::prediction::ModelKind;
use plugin_reliability::{EngineConfig, Error, FeatureVector, ReliabilityEngine, ReliabilityEventType};
use std::time::Duration;

async fn trained_engine() -> ReliabilityEngine {
    let engine = ReliabilityEngine::new(EngineConfig::default()).unwrap();
    for i in 0..30 {
        engine.record_outcome("alpha", 0.9).await;
        engine
            .record_outcome("beta", if i % 2 == 0 { 0.1 } else { 0.4 })
            .await;
    }
    for i in 0..120 {
        let mut observation = FeatureVector::new("alpha");
        observation.success_rate = if i % 10 == 0 { 0.3 } else { 0.95 };
        observation.avg_response_time = 80.0;
        engine.record_observation("alpha", observation).await;
    }
    engine
}

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("reliability.json");

    let original = trained_engine().await;
    original.save(&path).await.unwrap();

    let restored = ReliabilityEngine::new(EngineConfig::default()).unwrap();
    restored.load(&path).await.unwrap();

    let original_arms = original.arm_statistics().await;
    let restored_arms = restored.arm_statistics().await;
    assert_eq!(original_arms.len(), restored_arms.len());
    for (a, b) in original_arms.iter().zip(&restored_arms) {
        assert_eq!(a.arm, b.arm);
        assert!((a.mean_reward - b.mean_reward).abs() < 1e-9);
        assert_eq!(a.plays, b.plays);
    }

    let before = original.predict("alpha", ModelKind::Bayesian).await;
    let after = restored.predict("alpha", ModelKind::Bayesian).await;
    assert!((before.predicted_score - after.predicted_score).abs() < 1e-9);
    assert!((before.confidence - after.confidence).abs() < 1e-9);

    // 観測履歴は直近100件のみ保存される
    let snapshot = load_snapshot(&path).await.unwrap();
    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    assert_eq!(snapshot.features["alpha"].len(), 100);
    let restored_prediction = restored.predict("alpha", ModelKind::MovingAverage).await;
    assert!(restored_prediction.confidence > 0.0);
}

#[tokio::test]
async fn test_failed_load_resets_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let engine = trained_engine().await;
    let mut events = engine.subscribe();

    let err = engine
        .load(&dir.path().join("missing.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));

    // 既定状態で動作を継続
    assert!(engine.arm_statistics().await.is_empty());
    let bayesian = engine.predict("alpha", ModelKind::Bayesian).await;
    assert_eq!(bayesian.predicted_score, 0.5);
    let ensemble = engine.predict_ensemble("alpha").await;
    assert_eq!(ensemble.predicted_score, 0.5);

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event.event_type,
        ReliabilityEventType::SnapshotLoadFailed { .. }
    ));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.json");
    tokio::fs::write(&path, b"{\"version\": 1, \"bandit\": ")
        .await
        .unwrap();

    let engine = trained_engine().await;
    assert!(engine.load(&path).await.is_err());
    assert!(engine.arm_statistics().await.is_empty());
}

#[tokio::test]
async fn test_shutdown_saves_to_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shutdown.json");

    let mut config = EngineConfig::default();
    config.persistence.snapshot_path = Some(path.clone());
    let engine = ReliabilityEngine::new(config).unwrap();
    engine.record_outcome("alpha", 0.75).await;

    engine.shutdown().await.unwrap();

    let snapshot = load_snapshot(&path).await.unwrap();
    assert!((snapshot.arm_means()["alpha"] - 0.75).abs() < 1e-9);
    assert_eq!(snapshot.bandit.total_plays, 1);
}

#[tokio::test]
async fn test_non_finite_telemetry_survives_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nan.json");

    let engine = ReliabilityEngine::new(EngineConfig::default()).unwrap();
    for _ in 0..30 {
        engine.record_outcome("a", 0.9).await;
    }
    for i in 0..5 {
        let mut observation = FeatureVector::new("a");
        observation.success_rate = 1.0;
        observation.avg_response_time = 40.0 + i as f64;
        engine.record_observation("a", observation).await;
    }
    let mut broken = FeatureVector::new("a");
    broken.success_rate = 0.5;
    broken.avg_response_time = f64::NAN;
    broken.network_latency = f64::INFINITY;
    engine.record_observation("a", broken).await;

    let importance = engine.feature_importance("a").await;
    for (name, value) in &importance {
        assert!((0.0..=1.0).contains(value), "{} = {}", name, value);
    }

    engine.save(&path).await.unwrap();
    let restored = ReliabilityEngine::new(EngineConfig::default()).unwrap();
    restored.load(&path).await.unwrap();

    let stats = restored.arm_statistics().await;
    assert_eq!(stats.len(), 1);
    assert!((stats[0].mean_reward - 0.9).abs() < 1e-9);
    let before = engine.predict("a", ModelKind::Bayesian).await;
    let after = restored.predict("a", ModelKind::Bayesian).await;
    assert!((before.predicted_score - after.predicted_score).abs() < 1e-9);
    assert_ne!(after.predicted_score, 0.5);
}
