//! Subscription storage, delivery and polling for price notifications.
//!
//! This crate provides:
//! - A key-value store seam with Redis and in-memory backends
//! - Subscription persistence with an atomically maintained per-asset index
//! - Chat delivery through Telegram
//! - The rule-management surface used by command handlers
//! - The poll loop that evaluates subscriptions every tick

pub mod config;
pub mod kv;
pub mod notifier;
pub mod poller;
pub mod rules;
pub mod store;
pub mod telegram;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{RedisConfig, TelegramConfig};
pub use kv::{KvOp, KvStore, MemoryKv, RedisKv};
pub use notifier::{ChatChannel, DeliveryError, LogChannel, Notifier, NotifierConfig};
pub use poller::{PollError, Poller, PollerConfig, TickReport};
pub use rules::{RuleError, RuleLimits, RuleManager, ValidationError};
pub use store::{StoreError, SubscriptionStore};
pub use telegram::TelegramChannel;
