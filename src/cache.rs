//! TTL read-through cache with per-key single-flight.
//!
//! Each key owns an async slot lock. A caller that misses holds the slot
//! while its producer runs, so concurrent misses on the same key wait for
//! that one computation and then read the value it stored. Unrelated keys
//! never block each other.
//!
//! Nothing is evicted: the key space grows with the number of distinct
//! `(park, data kind)` pairs, which is small and fixed per process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Time source for entry ages.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<Entry<V>>>>;

pub struct TtlCache<V> {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the stored value for `key` if it is younger than `ttl`,
    /// otherwise run `producer` and store its result.
    ///
    /// A failing producer leaves the slot exactly as it was; the error is
    /// returned to this caller only, and the next caller retries.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(existing) = entry.as_ref() {
            let age = self.clock.now().saturating_duration_since(existing.stored_at);
            if age < ttl {
                tracing::trace!(key, ?age, "cache hit");
                return Ok(existing.value.clone());
            }
        }

        tracing::debug!(key, "cache miss, computing");
        let value = producer().await?;
        *entry = Some(Entry {
            value: value.clone(),
            stored_at: self.clock.now(),
        });
        Ok(value)
    }

    /// Drop the entry for `key`. The next call recomputes.
    pub async fn invalidate(&self, key: &str) {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(key).cloned()
        };
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    /// Number of keys that have ever been requested.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Slot<V> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_producer(
        counter: &AtomicUsize,
    ) -> impl Future<Output = Result<usize, String>> + '_ {
        async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_hits_cache() {
        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_millis(1000);

        let first = cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();
        let second = cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl_wall_clock() {
        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_millis(10);

        let a = cache.get_or_compute("expire", ttl, || counting_producer(&calls)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let b = cache.get_or_compute("expire", ttl, || counting_producer(&calls)).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_clock_expiry_boundary() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock(clock.clone());
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();
        clock.advance(Duration::from_secs(59));
        cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // age == ttl is no longer live
        clock.advance(Duration::from_secs(1));
        let v = cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn test_failed_producer_does_not_poison() {
        let clock = Arc::new(ManualClock::new());
        let cache: TtlCache<usize> = TtlCache::with_clock(clock.clone());
        let ttl = Duration::from_secs(10);

        cache
            .get_or_compute("k", ttl, || async { Ok::<_, String>(7) })
            .await
            .unwrap();
        clock.advance(Duration::from_secs(11));

        let err = cache
            .get_or_compute("k", ttl, || async { Err::<usize, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");

        // The failed refresh neither stored anything nor refreshed the old timestamp.
        let calls = AtomicUsize::new(0);
        let v = cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();
        assert_eq!(v, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_on_empty_slot_leaves_it_empty() {
        let cache: TtlCache<usize> = TtlCache::new();
        let ttl = Duration::from_secs(10);
        let _ = cache
            .get_or_compute("k", ttl, || async { Err::<usize, _>("down") })
            .await;
        let v = cache
            .get_or_compute("k", ttl, || async { Ok::<_, &str>(3) })
            .await
            .unwrap();
        assert_eq!(v, 3);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_computation() {
        let cache: TtlCache<usize> = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(10);

        let slow = || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst) + 1)
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_compute("k", ttl, slow),
            cache.get_or_compute("k", ttl, slow),
            cache.get_or_compute("k", ttl, slow),
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(10);

        cache.get_or_compute("parcasterix:shows", ttl, || counting_producer(&calls)).await.unwrap();
        cache.get_or_compute("parcasterix:calendar", ttl, || counting_producer(&calls)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(10);

        cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();
        cache.invalidate("k").await;
        let v = cache.get_or_compute("k", ttl, || counting_producer(&calls)).await.unwrap();
        assert_eq!(v, 2);
    }
}
