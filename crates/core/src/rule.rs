//! Notification rule definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The two supported notification trigger strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Fixed-period price reminder
    Interval,
    /// Price band alert
    Alert,
}

impl RuleKind {
    /// Every rule kind, in the order the poller evaluates them.
    pub const ALL: [RuleKind; 2] = [RuleKind::Interval, RuleKind::Alert];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Interval => "interval",
            RuleKind::Alert => "alert",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown rule kind: {0}")]
pub struct UnknownRuleKind(pub String);

impl FromStr for RuleKind {
    type Err = UnknownRuleKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interval" => Ok(RuleKind::Interval),
            "alert" => Ok(RuleKind::Alert),
            other => Err(UnknownRuleKind(other.to_string())),
        }
    }
}

/// A rule together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Push the current price every `every_minutes` minutes.
    Interval { every_minutes: u32 },
    /// Push while the price sits in `center ± band`.
    Alert { center: f64, band: f64 },
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Interval { .. } => RuleKind::Interval,
            Rule::Alert { .. } => RuleKind::Alert,
        }
    }
}

/// Lower and upper bound of an alert band.
#[inline]
pub fn alert_bounds(center: f64, band: f64) -> (f64, f64) {
    (center - band, center + band)
}
