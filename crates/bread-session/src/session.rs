//! The session entry and its persisted form.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use bread_cache::Entry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Persisted shape of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id (the cookie value).
    pub id: String,

    /// Stories the reader has opened.
    #[serde(default)]
    pub read: Vec<i64>,

    /// Stories the reader dismissed.
    #[serde(default)]
    pub ignored: Vec<i64>,

    /// Furthest story position the reader has browsed to.
    #[serde(default)]
    pub browsed: i64,

    /// Position up to which stories have been classified for this reader.
    #[serde(default)]
    pub classified: i64,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session was last written.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionState {
    read: BTreeSet<i64>,
    ignored: BTreeSet<i64>,
    browsed: i64,
    classified: i64,
}

/// A reader session.
///
/// Handlers share one `Arc<Session>` through the cache, so state lives
/// behind a mutex. Contention for a single session is low.
#[derive(Debug)]
pub struct Session {
    id: String,
    /// Not yet written to the backend; the first save creates it.
    is_new: AtomicBool,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a fresh session that has never been persisted.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_new: AtomicBool::new(true),
            created_at: Utc::now(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Rebuild a session read from the backend.
    pub fn from_record(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            is_new: AtomicBool::new(false),
            created_at: record.created_at,
            state: Mutex::new(SessionState {
                read: record.read.into_iter().collect(),
                ignored: record.ignored.into_iter().collect(),
                browsed: record.browsed,
                classified: record.classified,
            }),
        }
    }

    /// Snapshot the session for writing.
    pub fn to_record(&self) -> SessionRecord {
        let state = self.state.lock();
        SessionRecord {
            id: self.id.clone(),
            read: state.read.iter().copied().collect(),
            ignored: state.ignored.iter().copied().collect(),
            browsed: state.browsed,
            classified: state.classified,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session still has to be created in the backend.
    pub fn is_new(&self) -> bool {
        self.is_new.load(Ordering::Acquire)
    }

    /// Record that the backend now holds this session.
    pub fn mark_persisted(&self) {
        self.is_new.store(false, Ordering::Release);
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Mark a story as read. Returns `false` if it already was.
    ///
    /// A newly read story is no longer ignored, and classification starts
    /// over from the beginning since the reader's interests have moved.
    pub fn mark_read(&self, story: i64) -> bool {
        let mut state = self.state.lock();
        if !state.read.insert(story) {
            return false;
        }
        state.ignored.remove(&story);
        state.classified = 0;
        true
    }

    pub fn has_read(&self, story: i64) -> bool {
        self.state.lock().read.contains(&story)
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().read.len()
    }

    /// Mark a story as ignored. Returns `false` if it already was.
    pub fn mark_ignored(&self, story: i64) -> bool {
        self.state.lock().ignored.insert(story)
    }

    pub fn is_ignored(&self, story: i64) -> bool {
        self.state.lock().ignored.contains(&story)
    }

    /// Advance the browse position. Never moves backwards.
    pub fn mark_browsed(&self, position: i64) -> i64 {
        let mut state = self.state.lock();
        state.browsed = state.browsed.max(position);
        state.browsed
    }

    pub fn browsed(&self) -> i64 {
        self.state.lock().browsed
    }

    /// Advance the classification position. Never moves backwards.
    pub fn mark_classified(&self, position: i64) -> i64 {
        let mut state = self.state.lock();
        state.classified = state.classified.max(position);
        state.classified
    }

    pub fn classified(&self) -> i64 {
        self.state.lock().classified
    }
}

impl Entry for Session {
    fn key(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_new_and_empty() {
        let session = Session::new("s1");
        assert!(session.is_new());
        assert_eq!(session.key(), "s1");
        assert_eq!(session.read_count(), 0);
        assert_eq!(session.browsed(), 0);

        session.mark_persisted();
        assert!(!session.is_new());
    }

    #[test]
    fn test_marks_are_idempotent() {
        let session = Session::new("s1");
        assert!(session.mark_read(7));
        assert!(!session.mark_read(7));
        assert!(session.has_read(7));
        assert!(!session.has_read(8));

        assert!(session.mark_ignored(3));
        assert!(session.is_ignored(3));
    }

    #[test]
    fn test_reading_clears_ignore_and_classification() {
        let session = Session::new("s1");
        session.mark_ignored(4);
        session.mark_ignored(5);
        session.mark_classified(30);

        assert!(session.mark_read(4));
        assert!(!session.is_ignored(4));
        assert!(session.is_ignored(5));
        assert_eq!(session.classified(), 0);

        // Reading it again changes nothing
        session.mark_classified(12);
        assert!(!session.mark_read(4));
        assert_eq!(session.classified(), 12);
    }

    #[test]
    fn test_positions_only_advance() {
        let session = Session::new("s1");
        assert_eq!(session.mark_browsed(10), 10);
        assert_eq!(session.mark_browsed(4), 10);
        assert_eq!(session.mark_classified(5), 5);
        assert_eq!(session.mark_classified(2), 5);
    }

    #[test]
    fn test_record_round_trip_keeps_state() {
        let session = Session::new("s1");
        session.mark_read(2);
        session.mark_read(1);
        session.mark_ignored(9);
        session.mark_browsed(12);

        let record = session.to_record();
        assert_eq!(record.read, vec![1, 2]);
        assert_eq!(record.ignored, vec![9]);

        let restored = Session::from_record(record);
        assert!(!restored.is_new());
        assert!(restored.has_read(1));
        assert!(restored.is_ignored(9));
        assert_eq!(restored.browsed(), 12);
        assert_eq!(restored.created_at(), session.created_at());
    }
}
