//! Application configuration.

use pricebell_alerts::{NotifierConfig, PollerConfig, RedisConfig, RuleLimits};
use pricebell_engine::EvaluatorConfig;
use pricebell_feeds::FeedConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Application configuration. Every section is optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Quote feed endpoint.
    pub feed: FeedConfig,
    /// Poll loop cadence.
    pub poller: PollerConfig,
    /// Rule evaluation.
    pub evaluator: EvaluatorConfig,
    /// Push delivery.
    pub notifier: NotifierConfig,
    /// Accepted rule parameters.
    pub limits: RuleLimits,
    /// Subscription store.
    pub redis: RedisConfig,
    /// Log level, overridden by `--log-level`.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            poller: PollerConfig::default(),
            evaluator: EvaluatorConfig::default(),
            notifier: NotifierConfig::default(),
            limits: RuleLimits::default(),
            redis: RedisConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }
}
