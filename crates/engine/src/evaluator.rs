//! Rule evaluators.

use crate::message::{alert_message, interval_message};
use chrono::{DateTime, Duration, Utc};
use pricebell_core::{Quote, Rule, Subscription};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Configuration for rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Seconds an interval rule may fire early to absorb tick jitter.
    pub grace_secs: i64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { grace_secs: 10 }
    }
}

/// Outcome of evaluating one subscription against one quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Push `message` to the subscriber.
    Fire(String),
    /// Nothing to send this tick.
    Hold,
}

impl Decision {
    pub fn is_fire(&self) -> bool {
        matches!(self, Decision::Fire(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Decision::Fire(msg) => Some(msg),
            Decision::Hold => None,
        }
    }
}

/// Evaluates subscriptions. Never touches the store.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Decide whether `sub` fires for `quote` at `now`.
    pub fn decide(&self, quote: &Quote, sub: &Subscription, now: DateTime<Utc>) -> Decision {
        match sub.rule {
            Rule::Interval { every_minutes } => {
                if self.interval_due(every_minutes, sub.last_fired_at, now) {
                    Decision::Fire(interval_message(&sub.asset, quote.last_price))
                } else {
                    Decision::Hold
                }
            }
            Rule::Alert { center, band } => {
                if alert_triggered(quote.last_price, center, band) {
                    Decision::Fire(alert_message(&sub.asset, quote.last_price, center, band))
                } else {
                    Decision::Hold
                }
            }
        }
    }

    /// An interval rule is due once `every_minutes` (less the grace window)
    /// have passed since it last fired. Never-fired rules are always due.
    /// Price plays no part.
    pub fn interval_due(
        &self,
        every_minutes: u32,
        last_fired_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(last) = last_fired_at else {
            return true;
        };
        let period = Duration::minutes(i64::from(every_minutes));
        let grace = Duration::seconds(self.config.grace_secs);
        let elapsed = now - last;
        trace!(elapsed_secs = elapsed.num_seconds(), period_secs = period.num_seconds(), "Interval check");
        elapsed >= period - grace
    }
}

/// An alert fires while the price is strictly inside `center ± band`.
/// Prices on either bound or outside the band do not fire.
pub fn alert_triggered(price: f64, center: f64, band: f64) -> bool {
    let (low, high) = pricebell_core::alert_bounds(center, band);
    low < price && price < high
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn quote(price: f64) -> Quote {
        Quote::new("thb", "btc", 0.0, price, 0.0)
    }

    fn interval_sub(minutes: u32, last: Option<DateTime<Utc>>) -> Subscription {
        let mut sub = Subscription::new("U1", "btc", Rule::Interval { every_minutes: minutes }, t(0));
        sub.last_fired_at = last;
        sub
    }

    fn alert_sub(center: f64, band: f64) -> Subscription {
        Subscription::new("U1", "btc", Rule::Alert { center, band }, t(0))
    }

    #[test]
    fn test_never_fired_interval_fires_regardless_of_price() {
        let ev = Evaluator::default();
        let sub = interval_sub(10, None);
        assert!(ev.decide(&quote(0.0), &sub, t(0)).is_fire());
        assert!(ev.decide(&quote(123.0), &sub, t(0)).is_fire());
    }

    #[test]
    fn test_interval_fires_with_zero_price() {
        let ev = Evaluator::default();
        let sub = interval_sub(10, Some(t(0)));
        let decision = ev.decide(&Quote::default(), &sub, t(10));
        assert_eq!(decision, Decision::Fire("BTC price: 0.00".to_string()));
    }

    #[test]
    fn test_interval_not_due_within_period() {
        let ev = Evaluator::default();
        let sub = interval_sub(10, Some(t(0)));
        assert!(!ev.decide(&quote(1.0), &sub, t(0)).is_fire());
        assert!(!ev.decide(&quote(1.0), &sub, t(9)).is_fire());
        let just_before_grace = t(10) - Duration::seconds(11);
        assert!(!ev.decide(&quote(1.0), &sub, just_before_grace).is_fire());
    }

    #[test]
    fn test_interval_due_at_period_minus_grace() {
        let ev = Evaluator::default();
        let sub = interval_sub(10, Some(t(0)));
        let at_grace = t(10) - Duration::seconds(10);
        assert!(ev.decide(&quote(1.0), &sub, at_grace).is_fire());
        assert!(ev.decide(&quote(1.0), &sub, t(10)).is_fire());
        assert!(ev.decide(&quote(1.0), &sub, t(25)).is_fire());
    }

    #[test]
    fn test_interval_grace_configurable() {
        let ev = Evaluator::new(EvaluatorConfig { grace_secs: 0 });
        let sub = interval_sub(5, Some(t(0)));
        assert!(!ev.decide(&quote(1.0), &sub, t(5) - Duration::seconds(1)).is_fire());
        assert!(ev.decide(&quote(1.0), &sub, t(5)).is_fire());
    }

    #[test]
    fn test_alert_fires_inside_band() {
        let ev = Evaluator::default();
        let sub = alert_sub(100.0, 5.0);
        let decision = ev.decide(&quote(102.0), &sub, t(0));
        assert!(decision.is_fire());
        assert!(decision.message().unwrap().contains("95.00 - 105.00"));
    }

    #[test]
    fn test_alert_holds_outside_band() {
        let ev = Evaluator::default();
        let sub = alert_sub(100.0, 5.0);
        assert_eq!(ev.decide(&quote(94.0), &sub, t(0)), Decision::Hold);
        assert_eq!(ev.decide(&quote(110.0), &sub, t(0)), Decision::Hold);
    }

    #[test]
    fn test_alert_bounds_are_exclusive() {
        let ev = Evaluator::default();
        let sub = alert_sub(100.0, 5.0);
        assert_eq!(ev.decide(&quote(105.0), &sub, t(0)), Decision::Hold);
        assert_eq!(ev.decide(&quote(95.0), &sub, t(0)), Decision::Hold);
        assert!(ev.decide(&quote(95.01), &sub, t(0)).is_fire());
        assert!(ev.decide(&quote(104.99), &sub, t(0)).is_fire());
    }

    #[test]
    fn test_alert_ignores_last_fired() {
        let ev = Evaluator::default();
        let mut sub = alert_sub(100.0, 5.0);
        sub.last_fired_at = Some(t(0));
        assert!(ev.decide(&quote(100.0), &sub, t(0)).is_fire());
    }

    #[test]
    fn test_config_deserialize_default() {
        let config: EvaluatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.grace_secs, 10);
    }
}
