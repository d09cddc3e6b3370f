//! Quote data structures for the polled price feed.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Last traded quote for one currency pair.
///
/// Symbols are stored lower-cased. The secondary symbol is the asset users
/// subscribe to (e.g. `btc` in the `thb/btc` pair).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Primary (pricing) currency, e.g. `thb`
    pub primary: CompactString,
    /// Secondary (traded) currency, e.g. `btc`
    pub secondary: CompactString,
    /// 24h change
    pub change: f64,
    /// Last traded price in primary currency units
    pub last_price: f64,
    /// 24h traded volume
    pub volume_24h: f64,
}

impl Quote {
    /// Create a quote, folding both symbols to lower case.
    pub fn new(
        primary: &str,
        secondary: &str,
        change: f64,
        last_price: f64,
        volume_24h: f64,
    ) -> Self {
        Self {
            primary: CompactString::new(primary.to_lowercase()),
            secondary: CompactString::new(secondary.to_lowercase()),
            change,
            last_price,
            volume_24h,
        }
    }

    /// The asset identifier used for lookups and subscriptions.
    #[inline]
    pub fn asset(&self) -> &str {
        &self.secondary
    }
}

/// The full set of quotes fetched in one tick.
#[derive(Debug, Clone, Default)]
pub struct QuoteBook {
    quotes: Vec<Quote>,
}

impl QuoteBook {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self { quotes }
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Look up a quote by asset symbol (case-insensitive).
    ///
    /// Unknown symbols yield a zero-value quote with a price of 0.
    pub fn get(&self, symbol: &str) -> Quote {
        self.find(symbol).cloned().unwrap_or_default()
    }

    /// Look up a quote by asset symbol, `None` when the feed did not carry it.
    pub fn find(&self, symbol: &str) -> Option<&Quote> {
        self.quotes
            .iter()
            .find(|q| q.secondary.eq_ignore_ascii_case(symbol))
    }

    /// Distinct assets in feed order. When several pairs share a secondary
    /// symbol only the first is yielded, matching what `get` returns.
    pub fn assets(&self) -> impl Iterator<Item = &Quote> {
        self.quotes.iter().enumerate().filter_map(move |(i, q)| {
            let seen = self.quotes[..i]
                .iter()
                .any(|prev| prev.secondary == q.secondary);
            (!seen).then_some(q)
        })
    }
}

impl FromIterator<Quote> for QuoteBook {
    fn from_iter<I: IntoIterator<Item = Quote>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
