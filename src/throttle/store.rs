//! Counter storage for the fixed-window rate limiter.
//!
//! The limiter only talks to [`CounterStore`], so the in-process
//! [`MemoryStore`] can be replaced by a shared store without touching the
//! pipeline. A remote implementation must make `increment` a single atomic
//! round trip (e.g. `INCR` + `PEXPIRE` in one script): a separate read and
//! write lets two concurrent requests both observe the pre-increment count.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::AppResult;

/// Counting state of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub key: String,
    pub count: u32,
    pub window_start: Instant,
    pub ttl: Duration,
}

impl RateLimitRecord {
    fn open(key: &str, now: Instant, ttl: Duration) -> Self {
        Self {
            key: key.to_owned(),
            count: 0,
            window_start: now,
            ttl,
        }
    }

    /// A record expires once strictly more than `ttl` has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) > self.ttl
    }

    /// Time left until the window resets.
    pub fn retry_after(&self, now: Instant) -> Duration {
        (self.window_start + self.ttl).saturating_duration_since(now)
    }
}

/// Storage abstraction for rate limit counters.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Count one hit against `key` and return the record after the increment.
    ///
    /// An expired record is reset (`count = 0`, `window_start = now`) before
    /// the increment, so the first hit of every window returns `count == 1`.
    async fn increment(&self, key: &str, ttl: Duration) -> AppResult<RateLimitRecord>;

    /// Forget the record for `key`.
    async fn reset(&self, key: &str) -> AppResult<()>;

    /// Drop expired records, returning how many were removed.
    async fn sweep(&self) -> AppResult<usize> {
        Ok(0)
    }

    /// Number of live records, when the store can tell cheaply.
    fn len(&self) -> Option<usize> {
        None
    }
}

/// Process-local counter store.
///
/// Not shared between replicas: each process enforces its limits on the
/// traffic it sees.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, RateLimitRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record stored under `key`.
    pub fn get(&self, key: &str) -> Option<RateLimitRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str, ttl: Duration) -> AppResult<RateLimitRecord> {
        let now = Instant::now();
        // The shard lock is held for the whole read-modify-write and released
        // before returning, never across an await point.
        let mut record = self
            .records
            .entry(key.to_owned())
            .or_insert_with(|| RateLimitRecord::open(key, now, ttl));

        if record.is_expired(now) {
            record.count = 0;
            record.window_start = now;
        }
        record.ttl = ttl;
        record.count = record.count.saturating_add(1);

        Ok(record.clone())
    }

    async fn reset(&self, key: &str) -> AppResult<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn sweep(&self) -> AppResult<usize> {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        Ok(before.saturating_sub(self.records.len()))
    }

    fn len(&self) -> Option<usize> {
        Some(self.records.len())
    }
}
