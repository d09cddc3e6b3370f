//! Subscription persistence.
//!
//! Each subscription is a JSON record under its identity key
//! (`{user}:{asset}:{kind}`) and a member of the index set
//! `{kind}:{asset}`. The record and its index membership are always written
//! in one atomic batch, so a key is in the index iff its record exists.

use crate::kv::{KvOp, KvStore};
use pricebell_core::{RuleKind, Subscription, SubscriptionKey};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Subscription not found: {0}")]
    NotFound(String),
    #[error("Corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable subscription records plus their per-asset, per-kind index.
#[derive(Clone)]
pub struct SubscriptionStore {
    kv: Arc<dyn KvStore>,
}

impl SubscriptionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Check the backend is reachable.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.kv.ping().await
    }

    /// Write the record and add its key to the index, atomically. Overwrites
    /// any existing subscription at the same key.
    pub async fn put(&self, sub: &Subscription) -> Result<(), StoreError> {
        let key = sub.key();
        let record = key.to_string();
        let ops = [
            KvOp::Set {
                key: record.clone(),
                value: sub.to_json()?,
            },
            KvOp::SAdd {
                set: key.index(),
                member: record,
            },
        ];
        self.kv.atomic(&ops).await?;
        debug!(key = %key, "Subscription stored");
        Ok(())
    }

    /// Delete the record and drop its key from the index, atomically.
    /// Removing a subscription that does not exist succeeds.
    pub async fn remove(&self, user_id: &str, asset: &str, kind: RuleKind) -> Result<(), StoreError> {
        let key = SubscriptionKey::new(user_id, asset, kind);
        let record = key.to_string();
        let ops = [
            KvOp::Del {
                key: record.clone(),
            },
            KvOp::SRem {
                set: key.index(),
                member: record,
            },
        ];
        self.kv.atomic(&ops).await?;
        debug!(key = %key, "Subscription removed");
        Ok(())
    }

    /// Persist a new `last_fired_at` for a subscription that still exists.
    ///
    /// Never recreates a record: if the subscription was removed since it was
    /// read, nothing is written and `false` is returned.
    pub async fn record_fired(&self, sub: &Subscription) -> Result<bool, StoreError> {
        let key = sub.key();
        self.kv.set_if_exists(&key.to_string(), &sub.to_json()?).await
    }

    /// Keys indexed under `(asset, kind)`.
    pub async fn enumerate(&self, asset: &str, kind: RuleKind) -> Result<Vec<SubscriptionKey>, StoreError> {
        let members = self
            .kv
            .smembers(&SubscriptionKey::index_key(asset, kind))
            .await?;
        Ok(parse_keys(members, |key| key.kind == kind))
    }

    /// Keys of every `kind` subscription owned by `user_id`.
    ///
    /// Follows the scan cursor until it wraps back to 0. Not atomic with
    /// respect to concurrent writes.
    pub async fn enumerate_by_user(
        &self,
        user_id: &str,
        kind: RuleKind,
    ) -> Result<Vec<SubscriptionKey>, StoreError> {
        let pattern = SubscriptionKey::user_pattern(user_id, kind);
        let mut cursor = 0u64;
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        loop {
            let (next, page) = self.kv.scan_match(cursor, &pattern).await?;
            // A scan may return the same key more than once
            keys.extend(page.into_iter().filter(|k| seen.insert(k.clone())));
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(parse_keys(keys, |key| key.user_id == user_id && key.kind == kind))
    }

    /// Load one subscription.
    pub async fn get(&self, key: &SubscriptionKey) -> Result<Subscription, StoreError> {
        let raw = key.to_string();
        let json = self
            .kv
            .get(&raw)
            .await?
            .ok_or_else(|| StoreError::NotFound(raw.clone()))?;
        Subscription::from_json(key.kind, &json).map_err(|source| StoreError::Corrupt { key: raw, source })
    }
}

fn parse_keys(raw: Vec<String>, keep: impl Fn(&SubscriptionKey) -> bool) -> Vec<SubscriptionKey> {
    raw.into_iter()
        .filter_map(|k| match k.parse::<SubscriptionKey>() {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(key = %k, error = %e, "Ignoring malformed subscription key");
                None
            }
        })
        .filter(|key| keep(key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use pricebell_core::Rule;

    fn store() -> (SubscriptionStore, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::with_scan_page_size(3));
        (SubscriptionStore::new(kv.clone()), kv)
    }

    fn interval(user: &str, asset: &str) -> Subscription {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Subscription::new(user, asset, Rule::Interval { every_minutes: 10 }, t0)
    }

    fn alert(user: &str, asset: &str) -> Subscription {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Subscription::new(
            user,
            asset,
            Rule::Alert {
                center: 100.0,
                band: 5.0,
            },
            t0,
        )
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (store, _) = store();
        let sub = alert("U1", "btc");
        store.put(&sub).await.unwrap();
        assert_eq!(store.get(&sub.key()).await.unwrap(), sub);
    }

    #[tokio::test]
    async fn test_put_indexes_and_remove_unindexes() {
        let (store, kv) = store();
        let sub = interval("U1", "btc");
        store.put(&sub).await.unwrap();

        let keys = store.enumerate("btc", RuleKind::Interval).await.unwrap();
        assert_eq!(keys, vec![sub.key()]);
        assert!(store.enumerate("btc", RuleKind::Alert).await.unwrap().is_empty());

        store.remove("U1", "BTC", RuleKind::Interval).await.unwrap();
        assert!(store.enumerate("btc", RuleKind::Interval).await.unwrap().is_empty());
        assert_eq!(kv.get("U1:btc:interval").await.unwrap(), None);
        assert!(matches!(
            store.get(&sub.key()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let (store, _) = store();
        store.remove("nobody", "btc", RuleKind::Alert).await.unwrap();
        assert!(store.enumerate("btc", RuleKind::Alert).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let (store, _) = store();
        store.put(&interval("U1", "btc")).await.unwrap();

        let mut updated = interval("U1", "btc");
        updated.rule = Rule::Interval { every_minutes: 30 };
        store.put(&updated).await.unwrap();

        let keys = store.enumerate("btc", RuleKind::Interval).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(store.get(&keys[0]).await.unwrap().rule, Rule::Interval { every_minutes: 30 });
    }

    #[tokio::test]
    async fn test_enumerate_by_user_follows_cursor() {
        let (store, _) = store();
        for asset in ["btc", "eth", "xrp", "omg", "das"] {
            store.put(&interval("U1", asset)).await.unwrap();
            store.put(&alert("U1", asset)).await.unwrap();
        }
        store.put(&interval("U2", "btc")).await.unwrap();
        store.put(&interval("U1:x", "btc")).await.unwrap();

        let mut assets: Vec<String> = store
            .enumerate_by_user("U1", RuleKind::Interval)
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.asset)
            .collect();
        assets.sort();
        assert_eq!(assets, vec!["btc", "das", "eth", "omg", "xrp"]);

        let alerts = store.enumerate_by_user("U2", RuleKind::Alert).await.unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_get_corrupt_record() {
        let (store, kv) = store();
        kv.atomic(&[KvOp::Set {
            key: "U1:btc:alert".into(),
            value: "not json".into(),
        }])
        .await
        .unwrap();

        let key: SubscriptionKey = "U1:btc:alert".parse().unwrap();
        assert!(matches!(store.get(&key).await, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_record_fired_does_not_resurrect() {
        let (store, _) = store();
        let mut sub = interval("U1", "btc");
        store.put(&sub).await.unwrap();
        store.remove("U1", "btc", RuleKind::Interval).await.unwrap();

        sub.last_fired_at = Some(Utc::now());
        assert!(!store.record_fired(&sub).await.unwrap());
        assert!(matches!(store.get(&sub.key()).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enumerate_skips_malformed_members() {
        let (store, kv) = store();
        kv.atomic(&[KvOp::SAdd {
            set: "interval:btc".into(),
            member: "garbage".into(),
        }])
        .await
        .unwrap();
        store.put(&interval("U1", "btc")).await.unwrap();

        let keys = store.enumerate("btc", RuleKind::Interval).await.unwrap();
        assert_eq!(keys.len(), 1);
    }
}
