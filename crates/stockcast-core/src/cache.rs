//! In-memory fetch cache with per-key request coalescing.
//!
//! Entries move `Absent → Pending → Fresh → Stale → Pending → …`. Expiry is
//! the only invalidation; there is no purge API. Stale entries are dropped
//! whenever a new result is stored, so the map holds at most the keys fetched
//! within the longest TTL. While a key is `Pending`,
//! further callers wait on that key's flight guard and then read the stored
//! result instead of starting their own upstream fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::data_source::FetchResult;

/// Success TTL matching the ten-minute freshness window of the dashboard.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a `Success` entry.
    pub ttl: Duration,
    /// Lifetime of an `Empty` or `Failure` entry.
    pub failure_ttl: Duration,
}

impl CacheConfig {
    /// Failures live for a tenth of the success TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            failure_ttl: ttl / 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

/// Observable lifecycle state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Absent,
    Pending,
    Fresh,
    Stale,
}

/// How a lookup was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOrigin {
    /// Fresh entry read without waiting.
    Hit,
    /// Waited on another caller's in-flight fetch.
    Coalesced,
    /// This caller ran the fetcher.
    Fetched,
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub result: FetchResult<T>,
    pub origin: CacheOrigin,
}

#[derive(Debug)]
struct CacheEntry<T> {
    result: FetchResult<T>,
    fetched_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

type FlightGuards = HashMap<String, Arc<Mutex<()>>>;

/// Memoizes fetch outcomes per key for a TTL.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Debug)]
pub struct FetchCache<T> {
    config: CacheConfig,
    entries: Arc<RwLock<HashMap<String, CacheEntry<T>>>>,
    flights: Arc<StdMutex<FlightGuards>>,
}

impl<T> Clone for FetchCache<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            entries: Arc::clone(&self.entries),
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<T> Default for FetchCache<T>
where
    T: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<T> FetchCache<T>
where
    T: Clone + Send + Sync,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
            flights: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Returns the fresh entry for `key`, or runs `fetcher` once and stores
    /// its outcome.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetcher: F) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        self.lookup(key, fetcher).await.result
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), also reporting how the
    /// result was served.
    pub async fn lookup<F, Fut>(&self, key: &str, fetcher: F) -> Cached<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        if let Some(result) = self.fresh(key).await {
            tracing::trace!(key, "cache hit");
            return Cached {
                result,
                origin: CacheOrigin::Hit,
            };
        }

        let flight = self.flight_guard(key);
        let guard = flight.lock().await;

        // Filled by the caller we just waited on.
        if let Some(result) = self.fresh(key).await {
            tracing::debug!(key, "joined in-flight fetch");
            drop(guard);
            self.release_flight(key, &flight);
            return Cached {
                result,
                origin: CacheOrigin::Coalesced,
            };
        }

        tracing::debug!(key, "cache miss; fetching upstream");
        let result = fetcher().await;
        let ttl = if result.is_success() {
            self.config.ttl
        } else {
            self.config.failure_ttl
        };

        {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| entry.is_fresh());
            let pruned = before - entries.len();
            if pruned > 0 {
                tracing::debug!(pruned, "dropped expired cache entries");
            }
            entries.insert(
                key.to_owned(),
                CacheEntry {
                    result: result.clone(),
                    fetched_at: Instant::now(),
                    ttl,
                },
            );
        }

        drop(guard);
        self.release_flight(key, &flight);

        Cached {
            result,
            origin: CacheOrigin::Fetched,
        }
    }

    pub async fn state(&self, key: &str) -> EntryState {
        if self.in_flight(key) {
            return EntryState::Pending;
        }

        match self.entries.read().await.get(key) {
            None => EntryState::Absent,
            Some(entry) if entry.is_fresh() => EntryState::Fresh,
            Some(_) => EntryState::Stale,
        }
    }

    /// Number of stored entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn fresh(&self, key: &str) -> Option<FetchResult<T>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.result.clone())
    }

    fn flights(&self) -> std::sync::MutexGuard<'_, FlightGuards> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flight_guard(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.flights().entry(key.to_owned()).or_default())
    }

    fn in_flight(&self, key: &str) -> bool {
        self.flights()
            .get(key)
            .is_some_and(|flight| flight.try_lock().is_err())
    }

    /// Drops the guard from the map once no waiter holds a handle to it.
    fn release_flight(&self, key: &str, flight: &Arc<Mutex<()>>) {
        let mut flights = self.flights();
        let idle = flights
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight) && Arc::strong_count(flight) == 2);
        if idle {
            flights.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        calls: &AtomicUsize,
        value: FetchResult<u32>,
    ) -> impl Future<Output = FetchResult<u32>> + '_ {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { value }
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let cache = FetchCache::new(CacheConfig::with_ttl(Duration::from_secs(60)));
        let calls = AtomicUsize::new(0);

        let first = cache
            .lookup("2330", || counting_fetch(&calls, FetchResult::Success(7)))
            .await;
        let second = cache
            .lookup("2330", || counting_fetch(&calls, FetchResult::Success(8)))
            .await;

        assert_eq!(first.origin, CacheOrigin::Fetched);
        assert_eq!(second.origin, CacheOrigin::Hit);
        assert_eq!(second.result, FetchResult::Success(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let cache = FetchCache::new(CacheConfig::with_ttl(Duration::from_millis(100)));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("AAPL", || counting_fetch(&calls, FetchResult::Success(1)))
            .await;
        assert_eq!(cache.state("AAPL").await, EntryState::Fresh);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.state("AAPL").await, EntryState::Stale);

        let result = cache
            .get_or_fetch("AAPL", || counting_fetch(&calls, FetchResult::Success(2)))
            .await;
        assert_eq!(result, FetchResult::Success(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_expire_sooner_than_successes() {
        let cache = FetchCache::new(CacheConfig {
            ttl: Duration::from_secs(60),
            failure_ttl: Duration::from_millis(50),
        });

        cache
            .get_or_fetch("2330", || async {
                FetchResult::Failure(SourceError::transport("down"))
            })
            .await;
        cache
            .get_or_fetch("0050", || async { FetchResult::Empty })
            .await;
        cache
            .get_or_fetch("2317", || async { FetchResult::Success(1) })
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.state("2330").await, EntryState::Stale);
        assert_eq!(cache.state("0050").await, EntryState::Stale);
        assert_eq!(cache.state("2317").await, EntryState::Fresh);
    }

    #[tokio::test]
    async fn key_is_pending_while_fetch_is_in_flight() {
        let cache: FetchCache<u32> = FetchCache::default();
        assert_eq!(cache.state("2330").await, EntryState::Absent);

        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch("2330", || async move {
                        let _ = released.await;
                        FetchResult::Success(1)
                    })
                    .await
            })
        };

        for _ in 0..50 {
            if cache.state("2330").await == EntryState::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cache.state("2330").await, EntryState::Pending);

        let _ = release.send(());
        let result = leader.await.expect("leader task completes");
        assert_eq!(result, FetchResult::Success(1));
        assert_eq!(cache.state("2330").await, EntryState::Fresh);
    }

    #[tokio::test]
    async fn storing_a_result_drops_expired_keys() {
        let cache = FetchCache::new(CacheConfig::with_ttl(Duration::from_millis(50)));

        for key in ["2330", "2317", "AAPL"] {
            cache
                .get_or_fetch(key, || async { FetchResult::Success(1) })
                .await;
        }
        assert_eq!(cache.len().await, 3);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len().await, 3);

        cache
            .get_or_fetch("MSFT", || async { FetchResult::Success(2) })
            .await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.state("2330").await, EntryState::Absent);
        assert_eq!(cache.state("MSFT").await, EntryState::Fresh);
    }

    #[test]
    fn default_failure_ttl_is_a_tenth_of_success_ttl() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(600));
        assert_eq!(config.failure_ttl, Duration::from_secs(60));
    }
}
