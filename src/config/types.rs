use crate::error::{Error, Result};
use crate::health::{CheckKind, HealthStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 重みの合計に対する許容誤差
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// エンジン全体の設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ヘルスチェック集約設定
    pub health: HealthConfig,
    /// プローブ設定
    pub probes: ProbeConfig,
    /// 予測モデル設定
    pub prediction: PredictionConfig,
    /// バンディット設定
    pub bandit: BanditConfig,
    /// 特徴量履歴設定
    pub features: FeatureConfig,
    /// 永続化設定
    pub persistence: PersistenceConfig,
    /// 定期監視設定
    pub monitoring: MonitoringConfig,
}

impl EngineConfig {
    /// 設定全体を検証
    ///
    /// 構築時に一度だけ呼ばれ、不正な値は `Error::Configuration` になる。
    pub fn validate(&self) -> Result<()> {
        self.health.validate()?;
        self.probes.validate()?;
        self.prediction.validate()?;
        self.bandit.validate()?;
        self.features.validate()?;
        Ok(())
    }
}

/// プローブ種別ごとの集約重み
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeWeights {
    pub connectivity: f64,
    pub application: f64,
    pub data_quality: f64,
    pub performance: f64,
}

impl Default for ProbeWeights {
    fn default() -> Self {
        Self {
            connectivity: 0.30,
            application: 0.30,
            data_quality: 0.25,
            performance: 0.15,
        }
    }
}

impl ProbeWeights {
    /// 種別の重みを取得
    pub fn weight_for(&self, kind: CheckKind) -> f64 {
        match kind {
            CheckKind::Connectivity => self.connectivity,
            CheckKind::Application => self.application,
            CheckKind::DataQuality => self.data_quality,
            CheckKind::Performance => self.performance,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_weight_table(
            "health.weights",
            &[
                ("connectivity", self.connectivity),
                ("application", self.application),
                ("data_quality", self.data_quality),
                ("performance", self.performance),
            ],
        )
    }
}

/// ステータス判定の閾値
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusThresholds {
    /// この値以上で Healthy
    pub healthy: f64,
    /// この値以上で Degraded
    pub degraded: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            healthy: 0.8,
            degraded: 0.5,
        }
    }
}

impl StatusThresholds {
    /// スコアをステータスに変換（単調）
    pub fn classify(&self, score: f64) -> HealthStatus {
        let score = score.clamp(0.0, 1.0);
        if score >= self.healthy {
            HealthStatus::Healthy
        } else if score >= self.degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.degraded)
            || !(0.0..=1.0).contains(&self.healthy)
            || self.degraded > self.healthy
        {
            return Err(Error::Configuration(format!(
                "status thresholds must satisfy 0 <= degraded ({}) <= healthy ({}) <= 1",
                self.degraded, self.healthy
            )));
        }
        Ok(())
    }
}

/// ヘルスチェック集約設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub weights: ProbeWeights,
    pub thresholds: StatusThresholds,
    /// 履歴スコアの保持期間（秒）
    pub retention_secs: u64,
    /// 履歴スコアの最大保持数
    pub max_history_points: usize,
    /// 同時実行チェックサイクル数の上限
    pub max_concurrent_checks: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            weights: ProbeWeights::default(),
            thresholds: StatusThresholds::default(),
            retention_secs: 7 * 24 * 60 * 60,
            max_history_points: 10_000,
            max_concurrent_checks: 32,
        }
    }
}

impl HealthConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs.min(i64::MAX as u64) as i64)
    }

    fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        self.thresholds.validate()?;
        if self.retention_secs == 0 {
            return Err(Error::Configuration(
                "health.retention_secs must be positive".to_string(),
            ));
        }
        if self.max_history_points == 0 || self.max_concurrent_checks == 0 {
            return Err(Error::Configuration(
                "health.max_history_points and health.max_concurrent_checks must be positive"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// プローブ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub connectivity_timeout_ms: u64,
    pub application_timeout_ms: u64,
    pub data_quality_timeout_ms: u64,
    pub performance_timeout_ms: u64,
    /// これを超える往復時間は Degraded
    pub degraded_latency_ms: f64,
    /// パフォーマンス計測の反復呼び出し回数
    pub performance_sample_calls: usize,
    /// スループット計測の時間窓（ミリ秒）
    pub throughput_window_ms: u64,
    /// スループットスコア 1.0 に相当する毎秒呼び出し数
    pub target_throughput_rps: f64,
    /// スループット計測中の最大呼び出し数
    pub max_throughput_calls: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connectivity_timeout_ms: 5_000,
            application_timeout_ms: 5_000,
            data_quality_timeout_ms: 5_000,
            performance_timeout_ms: 10_000,
            degraded_latency_ms: 5_000.0,
            performance_sample_calls: 5,
            throughput_window_ms: 1_000,
            target_throughput_rps: 10.0,
            max_throughput_calls: 1_000,
        }
    }
}

impl ProbeConfig {
    /// 種別ごとのタイムアウト
    pub fn timeout_for(&self, kind: CheckKind) -> Duration {
        let ms = match kind {
            CheckKind::Connectivity => self.connectivity_timeout_ms,
            CheckKind::Application => self.application_timeout_ms,
            CheckKind::DataQuality => self.data_quality_timeout_ms,
            CheckKind::Performance => self.performance_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn throughput_window(&self) -> Duration {
        Duration::from_millis(self.throughput_window_ms)
    }

    fn validate(&self) -> Result<()> {
        let timeouts = [
            self.connectivity_timeout_ms,
            self.application_timeout_ms,
            self.data_quality_timeout_ms,
            self.performance_timeout_ms,
        ];
        if timeouts.iter().any(|t| *t == 0) {
            return Err(Error::Configuration(
                "probe timeouts must be positive".to_string(),
            ));
        }
        if self.degraded_latency_ms <= 0.0 || self.target_throughput_rps <= 0.0 {
            return Err(Error::Configuration(
                "probes.degraded_latency_ms and probes.target_throughput_rps must be positive"
                    .to_string(),
            ));
        }
        if self.performance_sample_calls == 0 {
            return Err(Error::Configuration(
                "probes.performance_sample_calls must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 観測コンポジットスコアの重みテーブル
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub success_rate: f64,
    pub response_time: f64,
    pub failure_count: f64,
    pub time_since_failure: f64,
    pub data_quality: f64,
    pub network_latency: f64,
    pub request_volume: f64,
    pub seasonal_factor: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            success_rate: 0.25,
            response_time: 0.15,
            failure_count: 0.15,
            time_since_failure: 0.10,
            data_quality: 0.15,
            network_latency: 0.10,
            request_volume: 0.05,
            seasonal_factor: 0.05,
        }
    }
}

impl CompositeWeights {
    /// (特徴量名, 重み) の一覧
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        [
            ("success_rate", self.success_rate),
            ("response_time", self.response_time),
            ("failure_count", self.failure_count),
            ("time_since_failure", self.time_since_failure),
            ("data_quality", self.data_quality),
            ("network_latency", self.network_latency),
            ("request_volume", self.request_volume),
            ("seasonal_factor", self.seasonal_factor),
        ]
    }
}

/// 予測モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub composite_weights: CompositeWeights,
    /// 指数平滑化の平滑化係数
    pub smoothing_alpha: f64,
    /// 移動平均の窓サイズ
    pub moving_average_window: usize,
    /// 信頼区間に使う標準偏差の窓サイズ
    pub volatility_window: usize,
    /// ベータ事前分布の初期パラメータ
    pub prior_alpha: f64,
    pub prior_beta: f64,
    /// 予測ホライズン（秒）
    pub horizon_secs: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            composite_weights: CompositeWeights::default(),
            smoothing_alpha: 0.3,
            moving_average_window: 10,
            volatility_window: 10,
            prior_alpha: 1.0,
            prior_beta: 1.0,
            horizon_secs: 3_600,
        }
    }
}

impl PredictionConfig {
    fn validate(&self) -> Result<()> {
        validate_weight_table("prediction.composite_weights", &self.composite_weights.entries())?;
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(Error::Configuration(format!(
                "prediction.smoothing_alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        if self.moving_average_window == 0 || self.volatility_window == 0 {
            return Err(Error::Configuration(
                "prediction windows must be positive".to_string(),
            ));
        }
        if self.prior_alpha <= 0.0 || self.prior_beta <= 0.0 {
            return Err(Error::Configuration(
                "prediction prior parameters must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// バンディット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanditConfig {
    /// 初期探索率
    pub initial_epsilon: f64,
    /// 報酬更新ごとの減衰率
    pub epsilon_decay: f64,
    /// アームごとの報酬履歴上限
    pub max_history: usize,
    /// 上限超過時に残す件数
    pub trim_to: usize,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            initial_epsilon: 0.1,
            epsilon_decay: 0.99,
            max_history: 1_000,
            trim_to: 500,
        }
    }
}

impl BanditConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_epsilon) {
            return Err(Error::Configuration(format!(
                "bandit.initial_epsilon must be in [0, 1], got {}",
                self.initial_epsilon
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(Error::Configuration(format!(
                "bandit.epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        if self.max_history == 0 || self.trim_to == 0 || self.trim_to > self.max_history {
            return Err(Error::Configuration(
                "bandit history caps must satisfy 0 < trim_to <= max_history".to_string(),
            ));
        }
        Ok(())
    }
}

/// 特徴量履歴設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// プラグインごとの履歴上限
    pub max_history: usize,
    /// スナップショットに保存する直近件数
    pub persisted_points: usize,
    /// ヘルスチェック結果から観測を記録するか
    pub record_from_health_checks: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_history: 1_000,
            persisted_points: 100,
            record_from_health_checks: true,
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<()> {
        if self.max_history < 2 {
            return Err(Error::Configuration(
                "features.max_history must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// 永続化設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// シャットダウン時に保存するスナップショットのパス
    pub snapshot_path: Option<PathBuf>,
    /// 保存処理のタイムアウト（秒）
    pub save_timeout_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            save_timeout_secs: 10,
        }
    }
}

impl PersistenceConfig {
    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.save_timeout_secs.max(1))
    }
}

/// 定期監視設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// チェック間隔（秒）
    pub interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn validate_weight_table(section: &str, weights: &[(&str, f64)]) -> Result<()> {
    if let Some((name, value)) = weights.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
        return Err(Error::Configuration(format!(
            "{}.{} must be a non-negative number, got {}",
            section, name, value
        )));
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::Configuration(format!(
            "{} must sum to 1.0, got {:.4}",
            section, sum
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = EngineConfig::default();
        config.health.weights.performance = 0.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = EngineConfig::default();
        config.health.weights.connectivity = -0.1;
        config.health.weights.application = 0.7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.health.thresholds = StatusThresholds {
            healthy: 0.4,
            degraded: 0.6,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classify_is_monotonic() {
        let thresholds = StatusThresholds::default();
        let mut previous = HealthStatus::Unhealthy;
        for step in 0..=100 {
            let status = thresholds.classify(step as f64 / 100.0);
            assert!(status.rank() >= previous.rank());
            previous = status;
        }
        assert_eq!(thresholds.classify(0.8), HealthStatus::Healthy);
        assert_eq!(thresholds.classify(0.79), HealthStatus::Degraded);
        assert_eq!(thresholds.classify(0.49), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_bandit_trim_must_fit_cap() {
        let mut config = EngineConfig::default();
        config.bandit.trim_to = 2_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_lookup() {
        let probes = ProbeConfig::default();
        assert_eq!(
            probes.timeout_for(CheckKind::Performance),
            Duration::from_secs(10)
        );
    }
}
