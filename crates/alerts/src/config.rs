//! Connection configuration for external collaborators.

use serde::{Deserialize, Serialize};

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL (`redis://[:password@]host:port[/db]`), or `memory://` for
    /// a process-local store.
    pub url: String,
    /// Timeout for establishing the connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Timeout for each individual store operation, in seconds.
    pub op_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            connect_timeout_secs: 10,
            op_timeout_secs: 5,
        }
    }
}

impl RedisConfig {
    /// Whether the URL selects the in-memory store.
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }

    /// Override the URL from `REDIS_URL` when set.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("REDIS_URL") {
            if !url.is_empty() {
                self.url = url;
            }
        }
        self
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

impl TelegramConfig {
    /// Read `TELEGRAM_BOT_TOKEN`. Returns None when unset or empty.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        if bot_token.is_empty() {
            return None;
        }
        Some(Self { bot_token })
    }
}
