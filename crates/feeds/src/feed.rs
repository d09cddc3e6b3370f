//! Quote source abstraction.

use crate::FeedError;
use async_trait::async_trait;
use pricebell_core::QuoteBook;
use std::sync::Arc;

/// Trait for anything that can produce the current set of quotes.
///
/// Called once per poll tick; the result is reused for every subscription
/// evaluated in that tick.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch every quote the feed currently publishes.
    async fn fetch(&self) -> Result<QuoteBook, FeedError>;
}

#[async_trait]
impl<T: QuoteSource + ?Sized> QuoteSource for Arc<T> {
    async fn fetch(&self) -> Result<QuoteBook, FeedError> {
        (**self).fetch().await
    }
}
