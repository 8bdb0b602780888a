//! Backing store boundary.
//!
//! The cache never performs I/O itself. It delegates to a [`BackingStore`]
//! on a cache miss (load) and when a resolved entry leaves the cache
//! (copy-back). Both calls run on tokio's blocking pool, so synchronous
//! database drivers can be used directly.

use std::fmt;
use std::marker::PhantomData;

use crate::entry::Entry;
use crate::error::{LoadError, SaveError};

/// Trait for the store the cache sits in front of.
///
/// Implementations must tolerate concurrent `load` calls for different keys.
/// The cache calls `load` at most once per pending key and `save` exactly
/// once per resolved entry it discards.
pub trait BackingStore: Send + Sync + 'static {
    /// The entry type stored in the cache.
    type Entry: Entry;

    /// Load the entry for `key`.
    ///
    /// Return [`LoadError::NotFound`] if the key does not exist and
    /// [`LoadError::Unavailable`] if the store could not answer.
    fn load(&self, key: &str) -> Result<Self::Entry, LoadError>;

    /// Write an entry back to the store.
    ///
    /// Failures are logged and counted by the cache but never retried.
    fn save(&self, entry: &Self::Entry) -> Result<(), SaveError>;
}

/// A [`BackingStore`] built from a pair of closures.
pub struct FnStore<E, L, S> {
    load: L,
    save: S,
    _entry: PhantomData<fn() -> E>,
}

impl<E, L, S> FnStore<E, L, S>
where
    E: Entry,
    L: Fn(&str) -> Result<E, LoadError> + Send + Sync + 'static,
    S: Fn(&E) -> Result<(), SaveError> + Send + Sync + 'static,
{
    /// Create a store from a load function and a save function.
    pub fn new(load: L, save: S) -> Self {
        Self {
            load,
            save,
            _entry: PhantomData,
        }
    }
}

impl<E, L, S> BackingStore for FnStore<E, L, S>
where
    E: Entry,
    L: Fn(&str) -> Result<E, LoadError> + Send + Sync + 'static,
    S: Fn(&E) -> Result<(), SaveError> + Send + Sync + 'static,
{
    type Entry = E;

    fn load(&self, key: &str) -> Result<E, LoadError> {
        (self.load)(key)
    }

    fn save(&self, entry: &E) -> Result<(), SaveError> {
        (self.save)(entry)
    }
}

impl<E, L, S> fmt::Debug for FnStore<E, L, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStore").finish_non_exhaustive()
    }
}
