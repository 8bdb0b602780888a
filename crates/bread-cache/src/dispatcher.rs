//! The dispatcher task.
//!
//! One task owns the key-to-line map and the recency list. Every operation
//! reaches it as a [`Message`] and is handled to completion before the next
//! one is taken, so the two structures never race. Handlers never await
//! store I/O; loads and copy-backs are handed to [`Workers`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::cache::CacheStats;
use crate::config::CacheConfig;
use crate::entry::Entry;
use crate::error::{Error, LoadError};
use crate::line::{Line, Reply, Slot, Waiter, notify_all};
use crate::recency::Recency;
use crate::store::BackingStore;
use crate::worker::Workers;

/// A request to the dispatcher.
pub(crate) enum Message<E> {
    /// Blocking lookup: reply now if resolved, otherwise park the waiter.
    Lookup { key: String, waiter: Waiter<E> },
    /// Non-blocking lookup: reply now, start a load if the key is unknown.
    LookupAsync {
        key: String,
        reply: oneshot::Sender<Option<Arc<E>>>,
    },
    /// Install a value, overwriting any existing one.
    Put {
        value: Arc<E>,
        reply: oneshot::Sender<()>,
    },
    /// Install a value only if the key has no line.
    Create {
        value: Arc<E>,
        reply: oneshot::Sender<bool>,
    },
    /// Outcome of a backing store load.
    Loaded {
        key: String,
        outcome: Result<Arc<E>, LoadError>,
    },
    /// Withdraw a parked waiter.
    Cancel { key: String, waiter_id: u64 },
    /// Remove a line, copying back its value.
    Invalidate {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    /// Copy back every resolved line without removing it.
    Flush { reply: oneshot::Sender<usize> },
    /// Expire idle lines.
    Sweep,
    Stats { reply: oneshot::Sender<CacheStats> },
    /// Stop, writing everything back first.
    Shutdown { reply: oneshot::Sender<()> },
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    loads: u64,
    not_found: u64,
    load_failures: u64,
    evictions: u64,
    expirations: u64,
    copy_backs: u64,
}

pub(crate) struct Dispatcher<S: BackingStore> {
    lines: HashMap<String, Line<S::Entry>>,
    /// Keys with a load outstanding, whether or not their line survived.
    loading: HashSet<String>,
    recency: Recency,
    capacity: usize,
    ttl: Option<Duration>,
    /// Weak so the dispatcher stops once every cache handle is dropped.
    inbox: mpsc::WeakSender<Message<S::Entry>>,
    workers: Workers<S>,
    counters: Counters,
}

impl<S: BackingStore> Dispatcher<S> {
    pub fn new(
        config: &CacheConfig,
        store: S,
        inbox: mpsc::WeakSender<Message<S::Entry>>,
    ) -> Self {
        Self {
            lines: HashMap::with_capacity(config.capacity),
            loading: HashSet::new(),
            recency: Recency::new(),
            capacity: config.capacity,
            ttl: config.ttl,
            inbox,
            workers: Workers::new(config, store),
            counters: Counters::default(),
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<Message<S::Entry>>) {
        debug!(capacity = self.capacity, ttl = ?self.ttl, "Cache dispatcher started");

        while let Some(message) = rx.recv().await {
            if let Message::Shutdown { reply } = message {
                self.close(&mut rx).await;
                let _ = reply.send(());
                return;
            }
            self.handle(message);
            debug_assert_eq!(self.recency.len(), self.lines.len());
            self.workers.reap();
        }

        // Every handle was dropped
        self.close(&mut rx).await;
    }

    fn handle(&mut self, message: Message<S::Entry>) {
        match message {
            Message::Lookup { key, waiter } => self.lookup(key, waiter),
            Message::LookupAsync { key, reply } => self.lookup_async(key, reply),
            Message::Put { value, reply } => {
                self.put(value);
                let _ = reply.send(());
            }
            Message::Create { value, reply } => {
                let _ = reply.send(self.create(value));
            }
            Message::Loaded { key, outcome } => self.loaded(key, outcome),
            Message::Cancel { key, waiter_id } => self.cancel(&key, waiter_id),
            Message::Invalidate { key, reply } => {
                let _ = reply.send(self.invalidate(&key));
            }
            Message::Flush { reply } => {
                let _ = reply.send(self.flush());
            }
            Message::Sweep => self.sweep(),
            Message::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            // run and close take Shutdown off the inbox before it gets here
            Message::Shutdown { .. } => {}
        }
    }

    fn lookup(&mut self, key: String, waiter: Waiter<S::Entry>) {
        self.expire_if_idle(&key);
        let Some(line) = self.lines.get_mut(&key) else {
            self.counters.misses += 1;
            let line = self.admit(key.clone(), None);
            let _ = line.park(waiter);
            self.spawn_load(key);
            return;
        };

        match line.park(waiter) {
            Ok(()) => {
                self.counters.misses += 1;
                trace!(key = %key, "Waiting on in-flight load");
            }
            Err(waiter) => {
                self.counters.hits += 1;
                line.touch();
                self.recency.promote(line.handle);
                let _ = waiter.tx.send(Ok(line.value().cloned()));
            }
        }
    }

    fn lookup_async(&mut self, key: String, reply: oneshot::Sender<Option<Arc<S::Entry>>>) {
        self.expire_if_idle(&key);
        let Some(line) = self.lines.get_mut(&key) else {
            self.counters.misses += 1;
            let _ = reply.send(None);
            self.admit(key.clone(), None);
            self.spawn_load(key);
            return;
        };

        match line.value().cloned() {
            Some(value) => {
                self.counters.hits += 1;
                line.touch();
                self.recency.promote(line.handle);
                let _ = reply.send(Some(value));
            }
            None => {
                self.counters.misses += 1;
                let _ = reply.send(None);
            }
        }
    }

    fn put(&mut self, value: Arc<S::Entry>) {
        let key = value.key().to_string();
        match self.lines.get_mut(&key) {
            Some(line) => {
                let waiters = line.resolve(Arc::clone(&value));
                line.touch();
                self.recency.promote(line.handle);
                notify_all(waiters, Ok(Some(value)));
            }
            None => {
                self.admit(key, Some(value));
            }
        }
    }

    fn create(&mut self, value: Arc<S::Entry>) -> bool {
        let key = value.key().to_string();
        if self.lines.contains_key(&key) {
            return false;
        }
        self.admit(key, Some(value));
        true
    }

    fn loaded(&mut self, key: String, outcome: Result<Arc<S::Entry>, LoadError>) {
        self.loading.remove(&key);
        match outcome {
            Ok(value) => match self.lines.get(&key).map(Line::is_pending) {
                Some(true) | None => {
                    debug!(key = %key, "Loaded from backing store");
                    self.put(value);
                }
                Some(false) => {
                    // A put or create resolved the line while the load ran
                    trace!(key = %key, "Discarding load for already resolved line");
                }
            },
            Err(LoadError::NotFound) => {
                self.counters.not_found += 1;
                debug!(key = %key, "Key not found in backing store");
                self.discard_pending(&key, Ok(None));
            }
            Err(LoadError::Unavailable(reason)) => {
                self.counters.load_failures += 1;
                warn!(key = %key, reason = %reason, "Backing store unavailable");
                let error = Error::Unavailable {
                    key: key.clone(),
                    reason,
                };
                self.discard_pending(&key, Err(error));
            }
        }
    }

    fn cancel(&mut self, key: &str, waiter_id: u64) {
        if let Some(line) = self.lines.get_mut(key) {
            if line.unpark(waiter_id) {
                trace!(key = %key, waiter_id, "Waiter cancelled");
            }
        }
    }

    fn invalidate(&mut self, key: &str) -> bool {
        if !self.lines.contains_key(key) {
            return false;
        }
        debug!(key = %key, "Invalidating line");
        self.remove_line(key, || Error::Evicted(key.to_string()));
        true
    }

    fn flush(&mut self) -> usize {
        let values: Vec<_> = self.lines.values().filter_map(Line::value).cloned().collect();
        let count = values.len();
        for value in values {
            self.copy_back(value);
        }
        debug!(count, "Flushed resolved lines");
        count
    }

    /// Walk from the least recently used end, removing resolved lines idle
    /// for at least the TTL. Stops at the first fresh line; pending lines
    /// are left alone.
    fn sweep(&mut self) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let Some(cutoff) = Instant::now().checked_sub(ttl) else {
            return;
        };

        let mut expired = Vec::new();
        let mut cursor = self.recency.back();
        while let Some(handle) = cursor {
            cursor = self.recency.prev(handle);
            let key = self.recency.key(handle);
            let Some(line) = self.lines.get(key) else {
                continue;
            };
            if line.last_used > cutoff {
                break;
            }
            if !line.is_pending() {
                expired.push(key.to_string());
            }
        }

        for key in &expired {
            debug!(key = %key, "Line expired");
            self.counters.expirations += 1;
            self.remove_line(key, || Error::Closed);
        }
    }

    /// Expire `key` now if it is resolved and has been idle for the TTL,
    /// so a lookup racing the next sweep cannot revive it.
    fn expire_if_idle(&mut self, key: &str) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let idle = self
            .lines
            .get(key)
            .is_some_and(|line| !line.is_pending() && line.last_used.elapsed() >= ttl);
        if idle {
            debug!(key = %key, "Line expired on lookup");
            self.counters.expirations += 1;
            self.remove_line(key, || Error::Closed);
        }
    }

    fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            size: self.lines.len(),
            capacity: self.capacity,
            pending: self.lines.values().filter(|l| l.is_pending()).count(),
            hits: c.hits,
            misses: c.misses,
            loads: c.loads,
            not_found: c.not_found,
            load_failures: c.load_failures,
            evictions: c.evictions,
            expirations: c.expirations,
            copy_backs: c.copy_backs,
            save_failures: self.workers.save_failures(),
        }
    }

    /// Create a line for a key that has none, evicting first if full.
    fn admit(&mut self, key: String, value: Option<Arc<S::Entry>>) -> &mut Line<S::Entry> {
        if self.lines.len() >= self.capacity {
            self.evict_one();
        }

        let handle = self.recency.push_front(key.clone());
        let line = match value {
            Some(value) => Line::resolved(handle, value),
            None => Line::pending(handle),
        };
        trace!(key = %key, size = self.lines.len() + 1, "Line admitted");
        self.lines.entry(key).insert_entry(line).into_mut()
    }

    /// Evict the least recently used resolved line. Pending lines are only
    /// chosen when nothing else is resident.
    fn evict_one(&mut self) {
        let victim = std::iter::successors(self.recency.back(), |&h| self.recency.prev(h))
            .find(|&h| {
                self.lines
                    .get(self.recency.key(h))
                    .is_some_and(|line| !line.is_pending())
            })
            .or_else(|| self.recency.back());

        let Some(handle) = victim else {
            return;
        };
        let key = self.recency.key(handle).to_string();
        debug!(key = %key, "Evicting least recently used line");
        self.counters.evictions += 1;
        self.remove_line(&key, || Error::Evicted(key.clone()));
    }

    /// Remove a line. A resolved value is copied back; waiters on a pending
    /// line receive `abandoned()`.
    fn remove_line(&mut self, key: &str, abandoned: impl FnOnce() -> Error) {
        let Some(line) = self.lines.remove(key) else {
            return;
        };
        self.recency.remove(line.handle);

        match line.slot {
            Slot::Resolved(value) => self.copy_back(value),
            Slot::Pending { waiters } => notify_all(waiters, Err(abandoned())),
        }
    }

    /// Remove a pending line after a failed load, replying to its waiters.
    fn discard_pending(&mut self, key: &str, reply: Reply<S::Entry>) {
        if !self.lines.get(key).is_some_and(Line::is_pending) {
            return;
        }
        if let Some(line) = self.lines.remove(key) {
            self.recency.remove(line.handle);
            if let Slot::Pending { waiters } = line.slot {
                notify_all(waiters, reply);
            }
        }
    }

    /// Start a load for `key` unless one is already outstanding. A load
    /// that outlived an evicted line resolves whichever line holds the key
    /// when it reports back.
    fn spawn_load(&mut self, key: String) {
        if self.loading.contains(&key) {
            trace!(key = %key, "Joining load already in flight");
            return;
        }
        match self.inbox.upgrade() {
            Some(inbox) => {
                self.loading.insert(key.clone());
                self.counters.loads += 1;
                debug!(key = %key, "Loading from backing store");
                self.workers.spawn_load(key, inbox);
            }
            None => self.remove_line(&key, || Error::Closed),
        }
    }

    fn copy_back(&mut self, value: Arc<S::Entry>) {
        self.counters.copy_backs += 1;
        self.workers.spawn_save(value);
    }

    /// Stop accepting requests, fail waiters, copy everything back and wait
    /// for the writes to finish.
    async fn close(&mut self, rx: &mut mpsc::Receiver<Message<S::Entry>>) {
        rx.close();
        while let Ok(message) = rx.try_recv() {
            match message {
                Message::Loaded { .. } => self.handle(message),
                Message::Lookup { waiter, .. } => {
                    let _ = waiter.tx.send(Err(Error::Closed));
                }
                Message::Shutdown { reply } => {
                    let _ = reply.send(());
                }
                _ => {}
            }
        }

        let keys: Vec<String> = self.recency.iter().map(str::to_string).collect();
        for key in &keys {
            self.remove_line(key, || Error::Closed);
        }

        let copy_backs = self.counters.copy_backs;
        self.workers.drain().await;
        debug!(copy_backs, "Cache dispatcher stopped");
    }
}
