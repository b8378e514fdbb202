use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::ClientError;

type Erased = Arc<dyn Any + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Result<Erased, ClientError>>>;

/// Identifies one cached read: the resource plus its canonical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: String,
    params: String,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: params.into(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}?{}", self.resource, self.params)
        }
    }
}

struct Entry {
    value: Erased,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, InFlight>,
    /// Last successful value per resource, kept across invalidation.
    latest: HashMap<String, Erased>,
}

/// Read-through cache with staleness, per-key request dedup, and
/// resource-level invalidation.
#[derive(Clone)]
pub struct QueryCache {
    stale_time: Duration,
    inner: Arc<Mutex<CacheInner>>,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            stale_time,
            inner: Arc::new(Mutex::new(CacheInner::default())),
        }
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// Return the cached value for `key` if it is fresh, otherwise run
    /// `fetcher`. Callers that arrive while a fetch for the same key is
    /// running wait for that fetch instead of starting their own. Errors are
    /// returned to every waiter and never cached.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<Arc<T>, ClientError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let shared = {
            let mut inner = self.lock();

            if let Some(entry) = inner.entries.get(&key) {
                if entry.fetched_at.elapsed() < self.stale_time {
                    if let Ok(value) = entry.value.clone().downcast::<T>() {
                        trace!("Cache hit for {}", key);
                        return Ok(value);
                    }
                }
            }

            match inner.in_flight.get(&key) {
                Some(running) => {
                    trace!("Joining in-flight fetch for {}", key);
                    running.clone()
                }
                None => {
                    debug!("Fetching {}", key);
                    let fut = fetcher();
                    let shared: InFlight = async move { fut.await.map(|v| Arc::new(v) as Erased) }
                        .boxed()
                        .shared();
                    inner.in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        {
            let mut inner = self.lock();
            // Only the fetch still registered for this key may store its
            // result. An invalidation in the meantime unregisters it.
            let current = inner
                .in_flight
                .get(&key)
                .is_some_and(|running| running.ptr_eq(&shared));
            if current {
                inner.in_flight.remove(&key);
                if let Ok(value) = &result {
                    inner
                        .latest
                        .insert(key.resource.clone(), value.clone());
                    inner.entries.insert(
                        key.clone(),
                        Entry {
                            value: value.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
            }
        }

        result?
            .downcast::<T>()
            .map_err(|_| ClientError::Decode(format!("cached value for {} has another type", key)))
    }

    /// Drop every entry for `resource` so the next read refetches. Fetches
    /// already running finish for their callers but are not stored.
    pub fn invalidate(&self, resource: &str) {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| k.resource != resource);
        inner.in_flight.retain(|k, _| k.resource != resource);
        debug!(
            "Invalidated {} ({} entries)",
            resource,
            before - inner.entries.len()
        );
    }

    /// The most recent successful value for any key of `resource`. Lets a
    /// paginated view keep showing the previous page while the next one
    /// loads.
    pub fn placeholder<T: Send + Sync + 'static>(&self, resource: &str) -> Option<Arc<T>> {
        let inner = self.lock();
        inner
            .latest
            .get(resource)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    /// Whether a fresh value is cached for `key`.
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .is_some_and(|e| e.fetched_at.elapsed() < self.stale_time)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.in_flight.clear();
        inner.latest.clear();
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, ClientError>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }.boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_skip_the_fetcher() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("properties", "city=Austin");

        let a = cache.fetch(key.clone(), counting_fetch(&calls, 1)).await.unwrap();
        let b = cache.fetch(key.clone(), counting_fetch(&calls, 2)).await.unwrap();
        assert_eq!((*a, *b), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let c = cache.fetch(key, counting_fetch(&calls, 3)).await.unwrap();
        assert_eq!(*c, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_forces_refetch() {
        let cache = QueryCache::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("favorites", "");

        cache.fetch(key.clone(), counting_fetch(&calls, 1)).await.unwrap();
        cache.invalidate("properties");
        assert!(cache.is_fresh(&key));

        cache.invalidate("favorites");
        assert!(!cache.is_fresh(&key));
        let v = cache.fetch(key, counting_fetch(&calls, 2)).await.unwrap();
        assert_eq!(*v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_reads_share_one_request() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("properties", "page=2");

        let slow = |calls: Arc<AtomicUsize>| {
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, ClientError>(7u32)
                }
            }
        };

        let (a, b) = tokio::join!(
            cache.fetch(key.clone(), slow(calls.clone())),
            cache.fetch(key.clone(), slow(calls.clone())),
        );
        assert_eq!((*a.unwrap(), *b.unwrap()), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_not_cached() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let key = QueryKey::new("properties", "");

        let failed = cache
            .fetch(key.clone(), || async {
                Err::<u32, _>(ClientError::Transport("connection refused".into()))
            })
            .await;
        assert!(failed.is_err());
        assert!(!cache.is_fresh(&key));

        let ok = cache.fetch(key, || async { Ok::<_, ClientError>(5u32) }).await;
        assert_eq!(*ok.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_keeps_last_page() {
        let cache = QueryCache::new(Duration::from_secs(30));
        assert!(cache.placeholder::<u32>("properties").is_none());

        cache
            .fetch(QueryKey::new("properties", "page=1"), || async {
                Ok::<_, ClientError>(1u32)
            })
            .await
            .unwrap();
        cache.invalidate("properties");

        assert_eq!(cache.placeholder::<u32>("properties").as_deref(), Some(&1));
        assert!(cache.placeholder::<String>("properties").is_none());
    }
}
