//! Telegram delivery channel.

use crate::config::TelegramConfig;
use crate::notifier::{ChatChannel, DeliveryError};
use async_trait::async_trait;
use teloxide::prelude::*;

impl From<teloxide::RequestError> for DeliveryError {
    fn from(err: teloxide::RequestError) -> Self {
        DeliveryError::Api(err.to_string())
    }
}

/// Pushes plain-text messages through the Telegram Bot API. The user id of
/// a subscription is the Telegram chat id.
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    /// Create a channel with the given bot token.
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
        }
    }
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    async fn push(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        let chat_id = parse_chat_id(user_id)?;
        self.bot.send_message(chat_id, text).await?;
        Ok(())
    }
}

fn parse_chat_id(user_id: &str) -> Result<ChatId, DeliveryError> {
    user_id
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| DeliveryError::InvalidRecipient(user_id.to_string()))
}
