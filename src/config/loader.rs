use super::types::EngineConfig;
use crate::error::Result;
use config::{Config, Environment, File};
use std::path::PathBuf;
use tracing::debug;

/// Configuration loader with builder pattern
///
/// 優先順位: デフォルト値 → 設定ファイル → `RELIABILITY__*` 環境変数
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.config_file = path.map(Into::into);
        self
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build and validate the final configuration
    pub fn build(self) -> Result<EngineConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&EngineConfig::default())?);

        if let Some(config_path) = &self.config_file {
            debug!("Loading engine configuration from {}", config_path.display());
            builder = builder.add_source(File::from(config_path.as_path()).required(true));
        } else {
            // 標準の場所を探索
            builder = builder
                .add_source(File::with_name("reliability").required(false))
                .add_source(File::with_name("config/reliability").required(false));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("RELIABILITY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
