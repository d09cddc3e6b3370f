//! Test doubles for the chat channel, quote feed and store backend.

use crate::kv::{KvOp, KvStore, MemoryKv};
use crate::notifier::{ChatChannel, DeliveryError};
use crate::store::StoreError;
use async_trait::async_trait;
use pricebell_core::QuoteBook;
use pricebell_feeds::{FeedError, QuoteSource};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records delivered messages; can be told to fail or stall.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ChatChannel for RecordingChannel {
    async fn push(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api("channel down".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Serves a fixed quote book, or a feed error when none is set.
#[derive(Default)]
pub struct StaticQuotes {
    book: Mutex<Option<QuoteBook>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl StaticQuotes {
    pub fn new(book: QuoteBook) -> Self {
        let quotes = Self::default();
        quotes.set(Some(book));
        quotes
    }

    pub fn set(&self, book: Option<QuoteBook>) {
        *self.book.lock().unwrap() = book;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn fetch(&self) -> Result<QuoteBook, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.book
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FeedError::RequestFailed("feed unreachable".to_string()))
    }
}

/// Memory store that fails selected operations.
#[derive(Default)]
pub struct FlakyKv {
    inner: MemoryKv,
    failing_gets: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
}

impl FlakyKv {
    pub fn inner(&self) -> &MemoryKv {
        &self.inner
    }

    pub fn fail_get(&self, key: &str) {
        self.failing_gets.lock().unwrap().insert(key.to_string());
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_guard(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.failing_gets.lock().unwrap().contains(key) {
            return Err(StoreError::Timeout(Duration::from_secs(5)));
        }
        self.inner.get(key).await
    }

    async fn set_if_exists(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.write_guard()?;
        self.inner.set_if_exists(key, value).await
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.inner.smembers(set).await
    }

    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
    ) -> Result<(u64, Vec<String>), StoreError> {
        self.inner.scan_match(cursor, pattern).await
    }

    async fn atomic(&self, ops: &[KvOp]) -> Result<(), StoreError> {
        self.write_guard()?;
        self.inner.atomic(ops).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
