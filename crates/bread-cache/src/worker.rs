//! Loader and copy-back workers.
//!
//! Both run off the dispatcher task: the store call itself happens on
//! tokio's blocking pool, gated by a semaphore so a burst of misses or
//! evictions cannot flood the backing store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, trace, warn};

use crate::config::CacheConfig;
use crate::dispatcher::Message;
use crate::entry::Entry;
use crate::error::LoadError;
use crate::store::BackingStore;

/// Spawns store calls on behalf of the dispatcher.
pub(crate) struct Workers<S: BackingStore> {
    store: Arc<S>,
    load_permits: Arc<Semaphore>,
    save_permits: Arc<Semaphore>,
    /// Copy-backs are tracked so shutdown can wait for them.
    saves: JoinSet<()>,
    save_failures: Arc<AtomicU64>,
}

impl<S: BackingStore> Workers<S> {
    pub fn new(config: &CacheConfig, store: S) -> Self {
        Self {
            store: Arc::new(store),
            load_permits: Arc::new(Semaphore::new(config.max_concurrent_loads)),
            save_permits: Arc::new(Semaphore::new(config.max_concurrent_saves)),
            saves: JoinSet::new(),
            save_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Load `key` and report the outcome to the dispatcher as a
    /// [`Message::Loaded`].
    pub fn spawn_load(&self, key: String, inbox: mpsc::Sender<Message<S::Entry>>) {
        let store = Arc::clone(&self.store);
        let permits = Arc::clone(&self.load_permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let lookup = key.clone();
            let outcome = match tokio::task::spawn_blocking(move || store.load(&lookup)).await {
                Ok(result) => result.map(Arc::new),
                Err(e) => {
                    error!(key = %key, error = %e, "Load task panicked");
                    Err(LoadError::Unavailable(format!("load task failed: {e}")))
                }
            };

            if inbox.send(Message::Loaded { key, outcome }).await.is_err() {
                trace!("Dispatcher closed before load completed");
            }
        });
    }

    /// Write `value` back to the store.
    pub fn spawn_save(&mut self, value: Arc<S::Entry>) {
        let store = Arc::clone(&self.store);
        let permits = Arc::clone(&self.save_permits);
        let failures = Arc::clone(&self.save_failures);

        self.saves.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let key = value.key().to_string();
            match tokio::task::spawn_blocking(move || store.save(&value)).await {
                Ok(Ok(())) => trace!(key = %key, "Entry copied back"),
                Ok(Err(e)) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "Copy-back failed");
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!(key = %key, error = %e, "Copy-back task panicked");
                }
            }
        });
    }

    /// Collect finished copy-back tasks without waiting.
    pub fn reap(&mut self) {
        while self.saves.try_join_next().is_some() {}
    }

    /// Wait for every outstanding copy-back.
    pub async fn drain(&mut self) {
        while self.saves.join_next().await.is_some() {}
    }

    pub fn save_failures(&self) -> u64 {
        self.save_failures.load(Ordering::Relaxed)
    }
}
