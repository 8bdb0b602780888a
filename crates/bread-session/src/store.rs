//! Adapter from a [`SessionBackend`] to the cache's load/save contract.

use bread_cache::{BackingStore, LoadError, SaveError};
use tracing::{debug, warn};

use crate::backend::SessionBackend;
use crate::error::StoreError;
use crate::session::Session;

/// Loads sessions from, and copies them back to, a [`SessionBackend`].
///
/// A missing row is reported as [`LoadError::NotFound`]; any other backend
/// failure is [`LoadError::Unavailable`] so callers can tell an unknown
/// session from an unreachable database.
#[derive(Debug)]
pub struct SessionStore<B> {
    backend: B,
}

impl<B: SessionBackend> SessionStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: SessionBackend> BackingStore for SessionStore<B> {
    type Entry = Session;

    fn load(&self, key: &str) -> Result<Session, LoadError> {
        match self.backend.read(key) {
            Ok(Some(record)) => Ok(Session::from_record(record)),
            Ok(None) => Err(LoadError::NotFound),
            Err(e) => {
                warn!(session_id = %key, error = %e, "Failed to read session");
                Err(LoadError::Unavailable(e.to_string()))
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), SaveError> {
        let record = session.to_record();
        debug!(
            session_id = %record.id,
            new = session.is_new(),
            browsed = record.browsed,
            "Saving session"
        );

        if session.is_new() {
            match self.backend.create(&record) {
                Ok(()) => {}
                // An earlier copy-back of the same session got there first
                Err(StoreError::Conflict(_)) => {
                    debug!(session_id = %record.id, "Session already created, updating");
                    self.backend.write(&record).map_err(SaveError::new)?;
                }
                Err(e) => return Err(SaveError::new(e)),
            }
            session.mark_persisted();
        } else {
            self.backend.write(&record).map_err(SaveError::new)?;
        }
        Ok(())
    }
}
