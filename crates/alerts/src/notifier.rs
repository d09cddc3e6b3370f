//! Push delivery to subscribers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Chat API error: {0}")]
    Api(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// A channel that can push plain UTF-8 text to a user.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn push(&self, user_id: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Channel that only logs what it would send. Used for dry runs.
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl ChatChannel for LogChannel {
    async fn push(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        info!(user_id = user_id, text = text, "Dry run: push suppressed");
        Ok(())
    }
}

/// Configuration for the notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Upper bound on one push call, in seconds.
    pub push_timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            push_timeout_secs: 10,
        }
    }
}

/// Wraps a chat channel: one bounded delivery attempt per call, failures
/// logged and reported as "not delivered".
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn ChatChannel>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(channel: Arc<dyn ChatChannel>, config: &NotifierConfig) -> Self {
        Self {
            channel,
            timeout: Duration::from_secs(config.push_timeout_secs),
        }
    }

    /// Attempt one delivery. Returns whether the message was delivered.
    pub async fn push(&self, user_id: &str, message: &str) -> bool {
        let result = match tokio::time::timeout(self.timeout, self.channel.push(user_id, message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                debug!(user_id = user_id, "Push delivered");
                true
            }
            Err(e) => {
                warn!(user_id = user_id, error = %e, "Push failed");
                false
            }
        }
    }
}
