//! Single-flight memo for expensive verification results.
//!
//! Concurrent callers with the same key share one computation. The entry is
//! kept for a fixed time after it is created, whether the computation
//! succeeded or not, then forgotten.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::error::CacheError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

type Outcome<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

struct Entry<V: Clone> {
    id: u64,
    outcome: Outcome<V>,
}

pub struct VerificationCache<V: Clone> {
    entries: Arc<Mutex<HashMap<String, Entry<V>>>>,
    ttl: Duration,
    next_id: Arc<AtomicU64>,
}

impl<V: Clone> Clone for VerificationCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<V> Default for VerificationCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V> VerificationCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the cached or in-flight result for `key`, starting `compute`
    /// only when neither exists.
    ///
    /// The computation runs on its own task, so it completes and is cached
    /// even if every caller goes away.
    ///
    /// # Errors
    /// Returns [`CacheError::Aborted`] if the computation panicked.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.try_get_or_compute(key, || compute().map(Ok::<V, CacheError>)).await
    }

    /// Like [`Self::get_or_compute`] for computations that can fail on their
    /// own. A failure is shared and cached like any other result.
    ///
    /// # Errors
    /// Returns the computation's error, or [`CacheError::Aborted`] if it
    /// panicked.
    pub async fn try_get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        let outcome = {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get(key) {
                debug!("verification cache hit");
                entry.outcome.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let outcome = Self::start(compute());
                entries.insert(
                    key.to_string(),
                    Entry {
                        id,
                        outcome: outcome.clone(),
                    },
                );
                self.schedule_eviction(key.to_string(), id);
                outcome
            }
        };
        outcome.await
    }

    fn start<Fut>(compute: Fut) -> Outcome<V>
    where
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        let task = tokio::spawn(compute);
        async move {
            task.await.unwrap_or_else(|err| {
                error!("verification task failed: {err}");
                Err(CacheError::Aborted)
            })
        }
        .boxed()
        .shared()
    }

    fn schedule_eviction(&self, key: String, id: u64) {
        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut entries = entries.lock().await;
            // A newer computation may have replaced this one.
            if entries.get(&key).is_some_and(|entry| entry.id == id) {
                entries.remove(&key);
            }
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>, value: bool) -> impl Future<Output = bool> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            value
        }
    }

    async fn explode() -> bool {
        panic!("boom")
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_computation() {
        let cache = VerificationCache::<bool>::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let calls = (0..10).map(|_| {
            let cache = cache.clone();
            let counter = Arc::clone(&counter);
            async move { cache.get_or_compute("k", || counting(&counter, true)).await }
        });
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| *result == Ok(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn result_is_reused_within_ttl() {
        let cache = VerificationCache::<bool>::default();
        let counter = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_compute("k", || counting(&counter, true)).await, Ok(true));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.get_or_compute("k", || counting(&counter, false)).await, Ok(true));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn result_expires_after_ttl() {
        let cache = VerificationCache::<bool>::default();
        let counter = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_compute("k", || counting(&counter, true)).await, Ok(true));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.get_or_compute("k", || counting(&counter, false)).await, Ok(false));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_compute_separately() {
        let cache = VerificationCache::<bool>::default();
        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(cache.get_or_compute("a", || counting(&counter, true)).await, Ok(true));
        assert_eq!(cache.get_or_compute("b", || counting(&counter, false)).await, Ok(false));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn computation_survives_cancelled_caller() {
        let cache = VerificationCache::<bool>::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_compute("k", || counting(&counter, true)),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get_or_compute("k", || counting(&counter, false)).await, Ok(true));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_computation_reports_aborted() {
        let cache = VerificationCache::<bool>::default();
        let result = cache.get_or_compute("k", explode).await;
        assert_eq!(result, Err(CacheError::Aborted));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_entry_expires_and_recomputes() {
        let cache = VerificationCache::<bool>::default();
        assert_eq!(cache.get_or_compute("k", explode).await, Err(CacheError::Aborted));
        assert_eq!(cache.get_or_compute("k", || async { true }).await, Err(CacheError::Aborted));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.get_or_compute("k", || async { true }).await, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_runs_from_creation() {
        let cache = VerificationCache::<bool>::default();
        let slow = || async {
            tokio::time::sleep(Duration::from_secs(40)).await;
            true
        };
        assert_eq!(cache.get_or_compute("k", slow).await, Ok(true));
        // 40 s spent computing, so 21 more pass the 60 s mark.
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn computed_failure_is_shared_and_expires() {
        let cache = VerificationCache::<bool>::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let failing = |counter: &Arc<AtomicUsize>| {
            let counter = Arc::clone(counter);
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CacheError::Aborted)
            }
        };

        assert_eq!(
            cache.try_get_or_compute("k", failing(&counter)).await,
            Err(CacheError::Aborted)
        );
        assert_eq!(
            cache.try_get_or_compute("k", failing(&counter)).await,
            Err(CacheError::Aborted)
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.try_get_or_compute("k", || async { Ok(true) }).await, Ok(true));
    }
}
