//! Shared fixtures for cache integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bread_cache::{BackingStore, Entry, LoadError, SaveError};
use parking_lot::Mutex;

#[derive(Debug, PartialEq)]
pub struct Item {
    pub key: String,
    pub value: String,
}

impl Item {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl Entry for Item {
    fn key(&self) -> &str {
        &self.key
    }
}

/// A store that answers every load with "pass" after an optional delay,
/// counts loads per key and records every save. Keys listed as missing
/// are reported as not found.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub delay: Duration,
    pub loads: Arc<Mutex<Vec<String>>>,
    pub saves: Arc<Mutex<Vec<(String, String)>>>,
    /// Number of initial loads answered with `Unavailable`.
    pub failures: Arc<AtomicUsize>,
    pub missing: Vec<String>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_missing(mut self, keys: &[&str]) -> Self {
        self.missing = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn load_count(&self, key: &str) -> usize {
        self.loads.lock().iter().filter(|k| k.as_str() == key).count()
    }

    pub fn saved_keys(&self) -> Vec<String> {
        self.saves.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Poll until at least `n` saves were recorded.
    pub async fn wait_for_saves(&self, n: usize) {
        for _ in 0..400 {
            if self.saves.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} saves, got {:?}", self.saves.lock());
    }
}

impl BackingStore for RecordingStore {
    type Entry = Item;

    fn load(&self, key: &str) -> Result<Item, LoadError> {
        self.loads.lock().push(key.to_string());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(LoadError::Unavailable("connection refused".into()));
        }
        if self.missing.iter().any(|k| k == key) {
            return Err(LoadError::NotFound);
        }
        Ok(Item::new(key, "pass"))
    }

    fn save(&self, entry: &Item) -> Result<(), SaveError> {
        self.saves
            .lock()
            .push((entry.key.clone(), entry.value.clone()));
        Ok(())
    }
}
