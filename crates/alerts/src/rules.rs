//! Rule management for command handlers.
//!
//! Validates rule parameters before touching the store, then creates,
//! removes or lists subscriptions.

use crate::store::{StoreError, SubscriptionStore};
use chrono::{DateTime, Utc};
use pricebell_core::{Rule, RuleKind, Subscription, SubscriptionKey};
use pricebell_engine::{describe_subscription, interval_message};
use pricebell_feeds::{FeedError, QuoteSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("User id must not be empty")]
    EmptyUser,
    #[error("Asset must not be empty")]
    EmptyAsset,
    #[error("Asset contains whitespace or a reserved character (: * ? [ ] \\): {0:?}")]
    InvalidAsset(String),
    #[error("Interval must be at least {min} minutes, got {got}")]
    IntervalTooShort { min: u32, got: u32 },
    #[error("Interval must be a multiple of {step} minutes, got {got}")]
    IntervalNotMultiple { step: u32, got: u32 },
    #[error("Alert price must be a positive number, got {0}")]
    InvalidCenter(f64),
    #[error("Alert range must be a positive number, got {0}")]
    InvalidBand(f64),
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid rule: {0}")]
    Validation(#[from] ValidationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
}

/// Bounds on accepted rule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleLimits {
    /// Shortest accepted interval, in minutes.
    pub min_interval_minutes: u32,
    /// Intervals must be a multiple of this many minutes.
    pub interval_step_minutes: u32,
}

impl Default for RuleLimits {
    fn default() -> Self {
        Self {
            min_interval_minutes: 5,
            interval_step_minutes: 5,
        }
    }
}

impl RuleLimits {
    pub fn validate(&self, rule: &Rule) -> Result<(), ValidationError> {
        match *rule {
            Rule::Interval { every_minutes } => {
                if every_minutes < self.min_interval_minutes {
                    return Err(ValidationError::IntervalTooShort {
                        min: self.min_interval_minutes,
                        got: every_minutes,
                    });
                }
                let step = self.interval_step_minutes;
                if step > 1 && every_minutes % step != 0 {
                    return Err(ValidationError::IntervalNotMultiple {
                        step,
                        got: every_minutes,
                    });
                }
            }
            Rule::Alert { center, band } => {
                if !center.is_finite() || center <= 0.0 {
                    return Err(ValidationError::InvalidCenter(center));
                }
                if !band.is_finite() || band <= 0.0 {
                    return Err(ValidationError::InvalidBand(band));
                }
            }
        }
        Ok(())
    }
}

/// Create, remove and list subscriptions on behalf of users.
#[derive(Clone)]
pub struct RuleManager {
    store: SubscriptionStore,
    quotes: Arc<dyn QuoteSource>,
    limits: RuleLimits,
}

impl RuleManager {
    pub fn new(store: SubscriptionStore, quotes: Arc<dyn QuoteSource>, limits: RuleLimits) -> Self {
        Self {
            store,
            quotes,
            limits,
        }
    }

    pub async fn set_interval(
        &self,
        user_id: &str,
        asset: &str,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Subscription, RuleError> {
        self.set(user_id, asset, Rule::Interval { every_minutes: minutes }, now)
            .await
    }

    pub async fn set_alert(
        &self,
        user_id: &str,
        asset: &str,
        center: f64,
        band: f64,
        now: DateTime<Utc>,
    ) -> Result<Subscription, RuleError> {
        self.set(user_id, asset, Rule::Alert { center, band }, now).await
    }

    pub async fn remove_interval(&self, user_id: &str, asset: &str) -> Result<(), RuleError> {
        self.remove(user_id, asset, RuleKind::Interval).await
    }

    pub async fn remove_alert(&self, user_id: &str, asset: &str) -> Result<(), RuleError> {
        self.remove(user_id, asset, RuleKind::Alert).await
    }

    /// Every `kind` subscription of `user_id`. Records that fail to load are
    /// skipped.
    pub async fn list_rules(&self, user_id: &str, kind: RuleKind) -> Result<Vec<Subscription>, RuleError> {
        let (subs, _) = self.load_rules(user_id, kind).await?;
        Ok(subs)
    }

    /// Reply text listing a user's rules of one kind. Records that fail to
    /// load get a line of their own.
    pub async fn render_rules(&self, user_id: &str, kind: RuleKind) -> Result<String, RuleError> {
        let (subs, unreadable) = self.load_rules(user_id, kind).await?;
        if subs.is_empty() && unreadable.is_empty() {
            return Ok(format!("You have no {} rules.", kind));
        }
        let mut text = format!("Your {} rules:", kind);
        for sub in &subs {
            text.push('\n');
            text.push_str(&describe_subscription(sub));
        }
        for key in &unreadable {
            text.push_str(&format!("\nCould not load {}", key.asset.to_uppercase()));
        }
        Ok(text)
    }

    /// Reply text with the current price of `asset`. Unknown assets read 0.
    pub async fn current_price(&self, asset: &str) -> Result<String, RuleError> {
        let book = self.quotes.fetch().await?;
        Ok(interval_message(asset, book.get(asset).last_price))
    }

    /// Subscriptions sorted by asset, plus the keys whose records could not
    /// be read.
    async fn load_rules(
        &self,
        user_id: &str,
        kind: RuleKind,
    ) -> Result<(Vec<Subscription>, Vec<SubscriptionKey>), RuleError> {
        let keys = self.store.enumerate_by_user(user_id, kind).await?;
        let mut subs = Vec::with_capacity(keys.len());
        let mut unreadable = Vec::new();
        for key in keys {
            match self.store.get(&key).await {
                Ok(sub) => subs.push(sub),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable subscription");
                    unreadable.push(key);
                }
            }
        }
        subs.sort_by(|a, b| a.asset.cmp(&b.asset));
        unreadable.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok((subs, unreadable))
    }

    async fn set(
        &self,
        user_id: &str,
        asset: &str,
        rule: Rule,
        now: DateTime<Utc>,
    ) -> Result<Subscription, RuleError> {
        let user_id = user_id.trim();
        let asset = asset.trim();
        if user_id.is_empty() {
            return Err(ValidationError::EmptyUser.into());
        }
        if asset.is_empty() {
            return Err(ValidationError::EmptyAsset.into());
        }
        if asset
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ':' | '*' | '?' | '[' | ']' | '\\'))
        {
            return Err(ValidationError::InvalidAsset(asset.to_string()).into());
        }
        self.limits.validate(&rule)?;

        let sub = Subscription::new(user_id, asset, rule, now);
        self.store.put(&sub).await?;
        info!(key = %sub.key(), "Rule set");
        Ok(sub)
    }

    async fn remove(&self, user_id: &str, asset: &str, kind: RuleKind) -> Result<(), RuleError> {
        self.store.remove(user_id.trim(), asset.trim(), kind).await?;
        info!(user_id = user_id, asset = asset, kind = %kind, "Rule removed");
        Ok(())
    }
}
