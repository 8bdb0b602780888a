//! Session cache that loads sessions from the session backend.
//!
//! This module provides the layer request handlers talk to:
//! - Loads sessions from the backend on a cache miss
//! - Caches sessions in memory with LRU eviction and an idle TTL
//! - Copies sessions back to the backend when they leave the cache
//! - Treats an unknown session id as a new, empty session
//!
//! The cache is a [`bread_cache::Cache`] over a [`SessionStore`].

use std::sync::Arc;

use bread_cache::{Cache, CacheConfig, CacheStats};
use tracing::debug;

use crate::backend::SessionBackend;
use crate::error::{Result, SessionError};
use crate::session::Session;
use crate::store::SessionStore;

/// How often `session` retries after losing a race to install a fresh
/// session.
const MAX_CREATE_ATTEMPTS: usize = 3;

/// Session cache backed by a [`SessionBackend`].
pub struct SessionCache<B: SessionBackend> {
    inner: Cache<SessionStore<B>>,
}

impl<B: SessionBackend> SessionCache<B> {
    /// Create a session cache. Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig, backend: B) -> Result<Self> {
        let inner = Cache::new(config, SessionStore::new(backend))?;
        Ok(Self { inner })
    }

    /// Get a session, waiting for the backend if it is not cached.
    ///
    /// An id the backend doesn't know yields a fresh session, which is
    /// created in the backend when it is first copied back.
    pub async fn session(&self, id: &str) -> Result<Arc<Session>> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            if let Some(session) = self.inner.get(id).await? {
                return Ok(session);
            }

            let fresh = Arc::new(Session::new(id));
            if self.inner.create(Arc::clone(&fresh)).await? {
                debug!(session_id = %id, "Started new session");
                return Ok(fresh);
            }
            // Another caller claimed the id in between; look it up again
        }
        Err(SessionError::Contended(id.to_string()))
    }

    /// Get a session only if it is already cached.
    ///
    /// A miss schedules a background load, so the session is likely to be
    /// resident on the reader's next request.
    pub async fn session_async(&self, id: &str) -> Result<Option<Arc<Session>>> {
        Ok(self.inner.get_async(id).await?)
    }

    /// Start a session with a newly generated id.
    pub async fn new_session(&self) -> Result<Arc<Session>> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let session = Arc::new(Session::new(uuid::Uuid::new_v4().to_string()));
            if self.inner.create(Arc::clone(&session)).await? {
                debug!(session_id = %session.id(), "Started new session");
                return Ok(session);
            }
        }
        Err(SessionError::Contended("generated id".into()))
    }

    /// Install `session` in the cache, replacing any cached copy.
    ///
    /// The replaced copy is not written back; `session` is, when it leaves.
    pub async fn save(&self, session: impl Into<Arc<Session>>) -> Result<()> {
        Ok(self.inner.put(session).await?)
    }

    /// Mark a story as read for a session.
    pub async fn mark_read(&self, id: &str, story: i64) -> Result<bool> {
        Ok(self.session(id).await?.mark_read(story))
    }

    /// Drop a session from the cache, writing it back first.
    pub async fn release(&self, id: &str) -> Result<bool> {
        Ok(self.inner.invalidate(id).await?)
    }

    /// Write every cached session back without evicting.
    pub async fn flush(&self) -> Result<usize> {
        Ok(self.inner.flush().await?)
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> Result<CacheStats> {
        Ok(self.inner.stats().await?)
    }

    /// Stop the cache, writing every session back.
    pub async fn shutdown(self) -> Result<()> {
        Ok(self.inner.shutdown().await?)
    }
}

impl<B: SessionBackend> Clone for SessionCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
