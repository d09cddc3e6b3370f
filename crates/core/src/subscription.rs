//! Subscription identity keys and persisted records.

use crate::rule::{Rule, RuleKind, UnknownRuleKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Malformed subscription key: {0}")]
    Malformed(String),
    #[error(transparent)]
    Kind(#[from] UnknownRuleKind),
}

/// Identity of a subscription: one per user, asset and rule kind.
///
/// Formats as `{user_id}:{asset}:{kind}`. The asset is always lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub user_id: String,
    pub asset: String,
    pub kind: RuleKind,
}

impl SubscriptionKey {
    pub fn new(user_id: impl Into<String>, asset: &str, kind: RuleKind) -> Self {
        Self {
            user_id: user_id.into(),
            asset: asset.to_lowercase(),
            kind,
        }
    }

    /// Name of the index set holding every key for `(asset, kind)`.
    pub fn index_key(asset: &str, kind: RuleKind) -> String {
        format!("{}:{}", kind, asset.to_lowercase())
    }

    /// Index set this key belongs to.
    pub fn index(&self) -> String {
        Self::index_key(&self.asset, self.kind)
    }

    /// Glob pattern matching every key of `kind` owned by `user_id`.
    pub fn user_pattern(user_id: &str, kind: RuleKind) -> String {
        format!("{}:*:{}", escape_glob(user_id), kind)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.asset, self.kind)
    }
}

impl FromStr for SubscriptionKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // User ids may contain ':', asset and kind never do
        let mut parts = s.rsplitn(3, ':');
        let (Some(kind), Some(asset), Some(user_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyError::Malformed(s.to_string()));
        };
        if user_id.is_empty() || asset.is_empty() {
            return Err(KeyError::Malformed(s.to_string()));
        }
        Ok(Self::new(user_id, asset, kind.parse()?))
    }
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// An active subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub user_id: String,
    pub asset: String,
    pub rule: Rule,
    /// Time of the last successful push. `None` means never fired.
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Create a subscription. `created_at` seeds `last_fired_at`, so interval
    /// rules first fire one full period after creation.
    pub fn new(user_id: impl Into<String>, asset: &str, rule: Rule, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            asset: asset.to_lowercase(),
            rule,
            last_fired_at: Some(created_at),
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.rule.kind()
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.user_id.clone(), &self.asset, self.kind())
    }

    /// Serialize to the persisted JSON encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SubscriptionRecord::from(self))
    }

    /// Decode a persisted record. The rule kind comes from the key the record
    /// was stored under.
    pub fn from_json(kind: RuleKind, json: &str) -> Result<Self, serde_json::Error> {
        let record: SubscriptionRecord = serde_json::from_str(json)?;
        Ok(record.into_subscription(kind))
    }
}

/// Flat persisted encoding of a subscription.
///
/// Field names are stable across releases; missing numeric fields default to
/// zero and unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    #[serde(rename = "currency")]
    pub asset: String,
    #[serde(default)]
    pub interval: u32,
    #[serde(default)]
    pub check_alert: f64,
    #[serde(default)]
    pub check_range: f64,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn into_subscription(self, kind: RuleKind) -> Subscription {
        let rule = match kind {
            RuleKind::Interval => Rule::Interval {
                every_minutes: self.interval,
            },
            RuleKind::Alert => Rule::Alert {
                center: self.check_alert,
                band: self.check_range,
            },
        };
        Subscription {
            user_id: self.user_id,
            asset: self.asset.to_lowercase(),
            rule,
            last_fired_at: self.pushed_at,
        }
    }
}

impl From<&Subscription> for SubscriptionRecord {
    fn from(sub: &Subscription) -> Self {
        let (interval, check_alert, check_range) = match sub.rule {
            Rule::Interval { every_minutes } => (every_minutes, 0.0, 0.0),
            Rule::Alert { center, band } => (0, center, band),
        };
        Self {
            user_id: sub.user_id.clone(),
            asset: sub.asset.clone(),
            interval,
            check_alert,
            check_range,
            pushed_at: sub.last_fired_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_format() {
        let key = SubscriptionKey::new("U123", "BTC", RuleKind::Interval);
        assert_eq!(key.to_string(), "U123:btc:interval");
        assert_eq!(key.index(), "interval:btc");
        assert_eq!(
            SubscriptionKey::user_pattern("U123", RuleKind::Alert),
            "U123:*:alert"
        );
    }

    #[test]
    fn test_key_parse() {
        let key: SubscriptionKey = "U123:eth:alert".parse().unwrap();
        assert_eq!(key, SubscriptionKey::new("U123", "eth", RuleKind::Alert));

        let key: SubscriptionKey = "group:42:btc:interval".parse().unwrap();
        assert_eq!(key.user_id, "group:42");
        assert_eq!(key.asset, "btc");

        assert!("btc:interval".parse::<SubscriptionKey>().is_err());
        assert!("U1:btc:weekly".parse::<SubscriptionKey>().is_err());
    }

    #[test]
    fn test_user_pattern_escapes_glob() {
        assert_eq!(
            SubscriptionKey::user_pattern("a*b", RuleKind::Interval),
            "a\\*b:*:interval"
        );
    }

    #[test]
    fn test_decode_legacy_record() {
        let json = r#"{"user_id":"U1","currency":"btc","interval":10,"check_alert":0,"check_range":0,"pushed_at":"2017-06-01T10:00:00.123456789+07:00"}"#;
        let sub = Subscription::from_json(RuleKind::Interval, json).unwrap();
        assert_eq!(sub.rule, Rule::Interval { every_minutes: 10 });
        assert_eq!(
            sub.last_fired_at.unwrap().timestamp(),
            Utc.with_ymd_and_hms(2017, 6, 1, 3, 0, 0).unwrap().timestamp()
        );
    }

    #[test]
    fn test_decode_tolerates_missing_and_extra_fields() {
        let json = r#"{"user_id":"U1","currency":"ETH","check_alert":100.5,"check_range":2,"pushed_at":null,"note":"x"}"#;
        let sub = Subscription::from_json(RuleKind::Alert, json).unwrap();
        assert_eq!(sub.asset, "eth");
        assert_eq!(
            sub.rule,
            Rule::Alert {
                center: 100.5,
                band: 2.0
            }
        );
        assert_eq!(sub.last_fired_at, None);
    }

    #[test]
    fn test_new_seeds_last_fired() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let sub = Subscription::new("U1", "BTC", Rule::Interval { every_minutes: 10 }, t0);
        assert_eq!(sub.last_fired_at, Some(t0));
        assert_eq!(sub.key().to_string(), "U1:btc:interval");

        let decoded = Subscription::from_json(RuleKind::Interval, &sub.to_json().unwrap()).unwrap();
        assert_eq!(decoded, sub);
    }
}
