//! Key-value store seam.
//!
//! Subscriptions are kept in a store offering string get/set, set
//! membership, cursor-based key scans and atomic multi-command batches.
//! `RedisKv` is the production backend; `MemoryKv` keeps everything in
//! process for dry runs and tests.

use crate::config::RedisConfig;
use crate::store::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Set { key: String, value: String },
    Del { key: String },
    SAdd { set: String, member: String },
    SRem { set: String, member: String },
}

/// Operations the subscription store needs from its backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite `key` only if it already exists. Returns whether it was written.
    async fn set_if_exists(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// All members of a set; empty when the set does not exist.
    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// One page of a key scan. Returns the next cursor (0 when the scan is
    /// complete) and the matching keys of this page.
    async fn scan_match(&self, cursor: u64, pattern: &str)
        -> Result<(u64, Vec<String>), StoreError>;

    /// Apply every op or none of them.
    async fn atomic(&self, ops: &[KvOp]) -> Result<(), StoreError>;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis backend.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisKv {
    /// Keys requested per SCAN round trip.
    const SCAN_COUNT: usize = 100;

    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        info!("Connecting to Redis...");

        let client = redis::Client::open(config.url.as_str())?;
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))??;

        info!("Redis connection established");

        Ok(Self {
            conn,
            op_timeout: Duration::from_secs(config.op_timeout_secs),
        })
    }

    async fn run<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.get(key)).await
    }

    async fn set_if_exists(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("SET").arg(key).arg(value).arg("XX").clone();
        let reply: Option<String> = self.run(cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.smembers(set)).await
    }

    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(Self::SCAN_COUNT)
            .clone();
        let page: (u64, Vec<String>) = self.run(cmd.query_async(&mut conn)).await?;
        Ok(page)
    }

    async fn atomic(&self, ops: &[KvOp]) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                KvOp::Set { key, value } => pipe.set(key, value).ignore(),
                KvOp::Del { key } => pipe.del(key).ignore(),
                KvOp::SAdd { set, member } => pipe.sadd(set, member).ignore(),
                KvOp::SRem { set, member } => pipe.srem(set, member).ignore(),
            };
        }

        let mut conn = self.conn.clone();
        let _: () = self.run(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("PING");
        let pong: String = self.run(cmd.query_async(&mut conn)).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("unexpected PING reply: {pong}")))
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    strings: BTreeMap<String, String>,
    sets: BTreeMap<String, BTreeSet<String>>,
}

/// In-process backend with Redis-like semantics.
#[derive(Debug)]
pub struct MemoryKv {
    state: Mutex<MemoryState>,
    scan_page_size: usize,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_scan_page_size(10)
    }

    /// Limit how many keys one `scan_match` call inspects, so callers must
    /// follow the cursor like they would against Redis.
    pub fn with_scan_page_size(scan_page_size: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            scan_page_size: scan_page_size.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.strings.get(key).cloned())
    }

    async fn set_if_exists(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.strings.get_mut(key) {
            Some(existing) => {
                *existing = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let state = self.lock()?;
        let all: BTreeSet<&String> = state.strings.keys().chain(state.sets.keys()).collect();

        let start = cursor as usize;
        let end = start.saturating_add(self.scan_page_size);
        let page = all
            .iter()
            .skip(start)
            .take(self.scan_page_size)
            .filter(|key| glob_match(pattern, key))
            .map(|key| (*key).clone())
            .collect();
        let next = if end >= all.len() { 0 } else { end as u64 };
        Ok((next, page))
    }

    async fn atomic(&self, ops: &[KvOp]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for op in ops {
            match op {
                KvOp::Set { key, value } => {
                    state.strings.insert(key.clone(), value.clone());
                }
                KvOp::Del { key } => {
                    state.strings.remove(key);
                    state.sets.remove(key);
                }
                KvOp::SAdd { set, member } => {
                    state
                        .sets
                        .entry(set.clone())
                        .or_default()
                        .insert(member.clone());
                }
                KvOp::SRem { set, member } => {
                    if let Some(members) = state.sets.get_mut(set) {
                        members.remove(member);
                        if members.is_empty() {
                            state.sets.remove(set);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }
        // Backtrack: let the last `*` swallow one more character
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
