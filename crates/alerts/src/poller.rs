//! Poll loop.
//!
//! Every tick: fetch quotes once, then for each asset and rule kind walk the
//! index, evaluate each subscription and push the ones that fire. A
//! successful push advances `last_fired_at`; a failed push leaves it alone
//! so the next tick retries. Errors are contained to the smallest scope:
//! a feed failure abandons the tick, a store failure skips one key, a
//! delivery failure skips one push.

use crate::notifier::Notifier;
use crate::store::SubscriptionStore;
use chrono::{DateTime, Utc};
use pricebell_core::{Quote, RuleKind, SubscriptionKey};
use pricebell_engine::{Decision, Evaluator};
use pricebell_feeds::{FeedError, QuoteSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Unable to fetch quotes: {0}")]
    Feed(#[from] FeedError),
}

impl PollError {
    /// Whether the next tick may succeed without anyone intervening.
    pub fn is_transient(&self) -> bool {
        match self {
            PollError::Feed(e) => e.is_transient(),
        }
    }
}

/// Poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between tick starts.
    pub interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Distinct assets in the fetched quote set
    pub assets: usize,
    /// Subscriptions loaded and evaluated
    pub evaluated: usize,
    /// Subscriptions whose rule fired
    pub fired: usize,
    /// Pushes delivered
    pub delivered: usize,
    /// Pushes that failed; retried next tick
    pub undelivered: usize,
    /// Index reads or records that could not be loaded
    pub skipped: usize,
    /// Delivered pushes whose `last_fired_at` could not be saved
    pub unsaved: usize,
}

pub struct Poller {
    quotes: Arc<dyn QuoteSource>,
    store: SubscriptionStore,
    evaluator: Evaluator,
    notifier: Notifier,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        quotes: Arc<dyn QuoteSource>,
        store: SubscriptionStore,
        evaluator: Evaluator,
        notifier: Notifier,
        config: PollerConfig,
    ) -> Self {
        Self {
            quotes,
            store,
            evaluator,
            notifier,
            config,
        }
    }

    /// Run ticks forever on a fixed cadence.
    ///
    /// Ticks never overlap: a tick that overruns the period delays the next
    /// one until it completes, after which the next tick starts immediately.
    pub async fn run(self) {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        info!(period_secs = period.as_secs(), "Starting poll loop");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.tick(Utc::now()).await {
                Ok(report) => info!(
                    assets = report.assets,
                    evaluated = report.evaluated,
                    fired = report.fired,
                    delivered = report.delivered,
                    undelivered = report.undelivered,
                    skipped = report.skipped,
                    unsaved = report.unsaved,
                    "Tick complete"
                ),
                Err(e) if e.is_transient() => warn!(error = %e, "Tick abandoned"),
                Err(e) => error!(error = %e, "Tick abandoned; feed needs attention"),
            }
        }
    }

    /// Process one tick as of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, PollError> {
        let book = self.quotes.fetch().await?;

        let mut report = TickReport::default();
        for quote in book.assets() {
            report.assets += 1;
            for kind in RuleKind::ALL {
                self.process_index(quote, kind, now, &mut report).await;
            }
        }
        Ok(report)
    }

    async fn process_index(
        &self,
        quote: &Quote,
        kind: RuleKind,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let keys = match self.store.enumerate(quote.asset(), kind).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(asset = quote.asset(), kind = %kind, error = %e, "Unable to read index");
                report.skipped += 1;
                return;
            }
        };

        for key in &keys {
            self.process_key(quote, key, now, report).await;
        }
    }

    async fn process_key(
        &self,
        quote: &Quote,
        key: &SubscriptionKey,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let mut sub = match self.store.get(key).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping subscription");
                report.skipped += 1;
                return;
            }
        };
        report.evaluated += 1;

        let message = match self.evaluator.decide(quote, &sub, now) {
            Decision::Fire(message) => message,
            Decision::Hold => return,
        };
        report.fired += 1;

        if !self.notifier.push(&sub.user_id, &message).await {
            report.undelivered += 1;
            return;
        }
        report.delivered += 1;

        // A failure here means the next tick may push this one again
        sub.last_fired_at = Some(now);
        match self.store.record_fired(&sub).await {
            Ok(true) => debug!(key = %key, "Recorded push"),
            Ok(false) => debug!(key = %key, "Subscription removed during tick"),
            Err(e) => {
                warn!(key = %key, error = %e, "Unable to record push");
                report.unsaved += 1;
            }
        }
    }
}
