//! Session database boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::StoreError;
use crate::session::SessionRecord;

/// Trait for session databases.
///
/// Calls are blocking; the cache runs them on tokio's blocking pool.
pub trait SessionBackend: Send + Sync + 'static {
    /// Read a session. Return `Ok(None)` if it doesn't exist.
    fn read(&self, id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert a session that has never been stored.
    fn create(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Update an existing session.
    fn write(&self, record: &SessionRecord) -> Result<(), StoreError>;
}

impl<B: SessionBackend + ?Sized> SessionBackend for Arc<B> {
    fn read(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        (**self).read(id)
    }

    fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        (**self).create(record)
    }

    fn write(&self, record: &SessionRecord) -> Result<(), StoreError> {
        (**self).write(record)
    }
}

/// An in-memory session backend.
///
/// Records are kept JSON-encoded, as a database column would hold them.
/// An optional per-call latency and an outage switch make it usable for
/// exercising the cache under realistic conditions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<HashMap<String, String>>,
    latency: Option<Duration>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate the database going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.read().contains_key(id)
    }

    fn enter(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("backend offline".into()));
        }
        Ok(())
    }
}

impl SessionBackend for MemoryBackend {
    fn read(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.enter()?;
        let rows = self.rows.read();
        match rows.get(id) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.enter()?;
        let raw = serde_json::to_string(record)?;
        let mut rows = self.rows.write();
        if rows.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id.clone()));
        }
        trace!(id = %record.id, "Session row created");
        rows.insert(record.id.clone(), raw);
        Ok(())
    }

    fn write(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.enter()?;
        let raw = serde_json::to_string(record)?;
        let mut rows = self.rows.write();
        match rows.get_mut(&record.id) {
            Some(row) => {
                trace!(id = %record.id, "Session row updated");
                *row = raw;
                Ok(())
            }
            None => Err(StoreError::Missing(record.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn test_create_then_read() {
        let backend = MemoryBackend::new();
        let record = Session::new("s1").to_record();

        assert!(backend.read("s1").unwrap().is_none());
        backend.create(&record).unwrap();
        assert_eq!(backend.read("s1").unwrap(), Some(record));
    }

    #[test]
    fn test_create_conflicts_and_write_requires_row() {
        let backend = MemoryBackend::new();
        let record = Session::new("s1").to_record();

        assert!(matches!(
            backend.write(&record),
            Err(StoreError::Missing(id)) if id == "s1"
        ));
        backend.create(&record).unwrap();
        assert!(matches!(
            backend.create(&record),
            Err(StoreError::Conflict(_))
        ));
        assert!(backend.write(&record).is_ok());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_offline_backend_is_unavailable() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.read("s1"),
            Err(StoreError::Unavailable(_))
        ));

        backend.set_offline(false);
        assert!(backend.read("s1").unwrap().is_none());
    }
}
