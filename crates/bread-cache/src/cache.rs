//! Public cache handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::config::CacheConfig;
use crate::dispatcher::{Dispatcher, Message};
use crate::error::{Error, Result};
use crate::line::{Reply, Waiter};
use crate::store::BackingStore;
use crate::ttl;

/// Concurrent copy-back cache in front of a [`BackingStore`].
///
/// This cache provides:
/// - Blocking ([`get`](Self::get)) and non-blocking
///   ([`get_async`](Self::get_async)) lookups
/// - At most one outstanding load per key, however many callers miss on it
/// - LRU eviction when capacity is reached
/// - Optional TTL-based expiry
/// - Copy-back of every resolved value that leaves the cache
///
/// Handles are cheap to clone and share one dispatcher task. The dispatcher
/// stops, writing everything back, when [`shutdown`](Self::shutdown) is
/// called or the last handle is dropped.
pub struct Cache<S: BackingStore> {
    inbox: mpsc::Sender<Message<S::Entry>>,
    next_waiter: Arc<AtomicU64>,
    config: CacheConfig,
}

impl<S: BackingStore> Cache<S> {
    /// Create a cache and start its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig, store: S) -> Result<Self> {
        config.validate()?;

        let (inbox, rx) = mpsc::channel(config.inbox_capacity);
        let dispatcher = Dispatcher::new(&config, store, inbox.downgrade());
        tokio::spawn(dispatcher.run(rx));

        if let Some(period) = config.effective_sweep_interval() {
            ttl::spawn_sweeper(inbox.downgrade(), period);
        }

        Ok(Self {
            inbox,
            next_waiter: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a value, loading it from the backing store on a miss.
    ///
    /// Waits until the key resolves. Returns `Ok(None)` if the store does
    /// not have the key and [`Error::Unavailable`] if the store failed.
    /// Concurrent calls for the same missing key share a single load.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<S::Entry>>> {
        let (waiter, rx) = self.waiter();
        self.send(Message::Lookup {
            key: key.to_string(),
            waiter,
        })
        .await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Like [`get`](Self::get), but gives up after `timeout`.
    ///
    /// On expiry only this caller is withdrawn from the key's waiters; the
    /// load carries on for everyone else.
    pub async fn get_with_timeout(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Arc<S::Entry>>> {
        let (waiter, rx) = self.waiter();
        let waiter_id = waiter.id;
        self.send(Message::Lookup {
            key: key.to_string(),
            waiter,
        })
        .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(reply) => reply.map_err(|_| Error::Closed)?,
            Err(_) => {
                trace!(key = %key, waiter_id, "Lookup timed out");
                self.send(Message::Cancel {
                    key: key.to_string(),
                    waiter_id,
                })
                .await?;
                Err(Error::Timeout(key.to_string()))
            }
        }
    }

    /// Get a value only if it is already resident.
    ///
    /// Never waits on the backing store. A miss on an unknown key starts a
    /// background load so a later lookup can succeed.
    pub async fn get_async(&self, key: &str) -> Result<Option<Arc<S::Entry>>> {
        self.request(|reply| Message::LookupAsync {
            key: key.to_string(),
            reply,
        })
        .await
    }

    /// Insert a new entry. Returns `false` if the key already has a line,
    /// resolved or still loading; the existing value is left untouched.
    pub async fn create(&self, entry: impl Into<Arc<S::Entry>>) -> Result<bool> {
        let value = entry.into();
        self.request(|reply| Message::Create { value, reply }).await
    }

    /// Insert or replace an entry.
    ///
    /// Callers waiting on a pending load for the same key receive this value.
    pub async fn put(&self, entry: impl Into<Arc<S::Entry>>) -> Result<()> {
        let value = entry.into();
        self.request(|reply| Message::Put { value, reply }).await
    }

    /// Remove a key, copying back its value if it had one.
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        self.request(|reply| Message::Invalidate {
            key: key.to_string(),
            reply,
        })
        .await
    }

    /// Copy back every resident value without evicting anything.
    ///
    /// Returns the number of values scheduled for writing.
    pub async fn flush(&self) -> Result<usize> {
        self.request(|reply| Message::Flush { reply }).await
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> Result<CacheStats> {
        self.request(|reply| Message::Stats { reply }).await
    }

    /// Get the current number of lines, including pending ones.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.stats().await?.size)
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Stop the dispatcher.
    ///
    /// Waiters still parked receive [`Error::Closed`], every resident value
    /// is copied back, and this returns once the writes have finished.
    /// Other handles fail with [`Error::Closed`] afterwards.
    pub async fn shutdown(self) -> Result<()> {
        self.request(|reply| Message::Shutdown { reply }).await
    }

    fn waiter(&self) -> (Waiter<S::Entry>, oneshot::Receiver<Reply<S::Entry>>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        (Waiter { id, tx }, rx)
    }

    async fn send(&self, message: Message<S::Entry>) -> Result<()> {
        self.inbox.send(message).await.map_err(|_| Error::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Message<S::Entry>,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| Error::Closed)
    }
}

impl<S: BackingStore> Clone for Cache<S> {
    fn clone(&self) -> Self {
        Self {
            inbox: self.inbox.clone(),
            next_waiter: Arc::clone(&self.next_waiter),
            config: self.config.clone(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of lines, resolved or pending.
    pub size: usize,

    /// Maximum capacity.
    pub capacity: usize,

    /// Lines waiting on a load.
    pub pending: usize,

    /// Lookups answered from a resolved line.
    pub hits: u64,

    /// Lookups that found no resolved line.
    pub misses: u64,

    /// Loads dispatched to the backing store.
    pub loads: u64,

    /// Loads that reported the key as absent.
    pub not_found: u64,

    /// Loads that failed because the store was unavailable.
    pub load_failures: u64,

    /// Lines removed under capacity pressure.
    pub evictions: u64,

    /// Lines removed by the TTL sweep.
    pub expirations: u64,

    /// Values handed to the copy-back worker.
    pub copy_backs: u64,

    /// Copy-backs the store rejected.
    pub save_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::error::{LoadError, SaveError};
    use crate::store::FnStore;

    use parking_lot::Mutex;

    #[derive(Debug, PartialEq)]
    struct TestEntry {
        key: String,
        value: String,
    }

    impl TestEntry {
        fn new(key: &str, value: &str) -> Self {
            Self {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
    }

    impl Entry for TestEntry {
        fn key(&self) -> &str {
            &self.key
        }
    }

    type Saved = Arc<Mutex<Vec<(String, String)>>>;

    fn passing_cache(config: CacheConfig) -> (Cache<impl BackingStore<Entry = TestEntry>>, Saved) {
        let saved: Saved = Arc::default();
        let log = Arc::clone(&saved);
        let store = FnStore::new(
            |key: &str| Ok(TestEntry::new(key, "pass")),
            move |e: &TestEntry| {
                log.lock().push((e.key.clone(), e.value.clone()));
                Ok(())
            },
        );
        (Cache::new(config, store).unwrap(), saved)
    }

    async fn wait_for_saves(saved: &Saved, n: usize) {
        for _ in 0..200 {
            if saved.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} saves, got {:?}", saved.lock());
    }

    #[tokio::test]
    async fn test_sync_get() {
        let (cache, _) = passing_cache(CacheConfig::new().with_capacity(2));

        let entry = cache.get("testo").await.unwrap().unwrap();
        assert_eq!(entry.value, "pass");
    }

    #[tokio::test]
    async fn test_async_get_then_sync() {
        let (cache, _) = passing_cache(CacheConfig::new().with_capacity(2));

        assert!(cache.get_async("testo").await.unwrap().is_none());

        let entry = cache.get("testo").await.unwrap().unwrap();
        assert_eq!(entry.value, "pass");

        let entry = cache.get_async("testo").await.unwrap().unwrap();
        assert_eq!(entry.value, "pass");
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = FnStore::new(
            |_: &str| Err::<TestEntry, _>(LoadError::NotFound),
            |_: &TestEntry| Ok(()),
        );
        let cache = Cache::new(CacheConfig::new(), store).unwrap();

        assert_eq!(cache.get("testo").await, Ok(None));

        // The failed line is discarded, so the next lookup loads again
        assert_eq!(cache.get("testo").await, Ok(None));
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.not_found, 2);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_create() {
        let (cache, _) = passing_cache(CacheConfig::new().with_capacity(2));

        assert!(cache.create(TestEntry::new("testo", "created")).await.unwrap());
        assert!(!cache.create(TestEntry::new("testo", "clash")).await.unwrap());

        let entry = cache.get("testo").await.unwrap().unwrap();
        assert_eq!(entry.value, "created");
        assert_eq!(cache.stats().await.unwrap().loads, 0);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (cache, _) = passing_cache(CacheConfig::new());

        cache.get("k").await.unwrap();
        cache.put(TestEntry::new("k", "updated")).await.unwrap();

        let entry = cache.get_async("k").await.unwrap().unwrap();
        assert_eq!(entry.value, "updated");
    }

    #[tokio::test]
    async fn test_lru_access_updates_order() {
        let (cache, saved) = passing_cache(CacheConfig::new().with_capacity(3));

        for key in ["s1", "s2", "s3"] {
            cache.create(TestEntry::new(key, key)).await.unwrap();
        }

        // Access s1 to make it recently used
        cache.get("s1").await.unwrap();

        // A 4th key evicts s2, now the least recently used
        cache.create(TestEntry::new("s4", "s4")).await.unwrap();
        wait_for_saves(&saved, 1).await;

        assert_eq!(saved.lock()[0], ("s2".to_string(), "s2".to_string()));
        assert!(cache.get_async("s1").await.unwrap().is_some());
        assert!(cache.get_async("s3").await.unwrap().is_some());
        assert!(cache.get_async("s4").await.unwrap().is_some());
        assert_eq!(cache.stats().await.unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn test_invalidate_copies_back() {
        let (cache, saved) = passing_cache(CacheConfig::new());

        cache.create(TestEntry::new("s1", "dirty")).await.unwrap();
        assert!(cache.invalidate("s1").await.unwrap());
        assert!(!cache.invalidate("s1").await.unwrap());

        wait_for_saves(&saved, 1).await;
        assert_eq!(saved.lock()[0], ("s1".to_string(), "dirty".to_string()));
        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_flush_keeps_lines() {
        let (cache, saved) = passing_cache(CacheConfig::new());

        cache.create(TestEntry::new("a", "1")).await.unwrap();
        cache.create(TestEntry::new("b", "2")).await.unwrap();

        assert_eq!(cache.flush().await.unwrap(), 2);
        wait_for_saves(&saved, 2).await;
        assert_eq!(cache.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_copies_back_and_closes() {
        let (cache, saved) = passing_cache(CacheConfig::new());
        let other = cache.clone();

        cache.create(TestEntry::new("a", "1")).await.unwrap();
        cache.get("b").await.unwrap();

        cache.shutdown().await.unwrap();

        // Writes have finished by the time shutdown returns
        let mut keys: Vec<String> = saved.lock().iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        assert_eq!(other.get("a").await, Err(Error::Closed));
    }

    #[tokio::test]
    async fn test_dropping_last_handle_copies_back() {
        let (cache, saved) = passing_cache(CacheConfig::new());

        cache.create(TestEntry::new("a", "1")).await.unwrap();
        drop(cache);

        wait_for_saves(&saved, 1).await;
    }

    #[tokio::test]
    async fn test_save_failures_are_counted() {
        let store = FnStore::new(
            |key: &str| Ok(TestEntry::new(key, "pass")),
            |_: &TestEntry| Err(SaveError::new("disk full")),
        );
        let cache = Cache::new(CacheConfig::new(), store).unwrap();

        cache.create(TestEntry::new("a", "1")).await.unwrap();
        cache.invalidate("a").await.unwrap();

        for _ in 0..200 {
            if cache.stats().await.unwrap().save_failures == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("save failure was not counted");
    }

    #[tokio::test]
    async fn test_stats() {
        let (cache, _) = passing_cache(CacheConfig::new().with_capacity(100));

        for i in 1..=5 {
            cache.get(&format!("s{i}")).await.unwrap();
        }
        cache.get("s1").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.size, 5);
        assert_eq!(stats.capacity, 100);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.loads, 5);
        assert_eq!(stats.misses, 5);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = FnStore::new(
            |key: &str| Ok(TestEntry::new(key, "pass")),
            |_: &TestEntry| Ok(()),
        );
        let result = Cache::new(CacheConfig::new().with_capacity(0), store);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
