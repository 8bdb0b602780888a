//! Reader sessions for bread.
//!
//! Sessions live in a [`bread_cache::Cache`] in front of the session
//! database:
//! - [`Session`] is the cached entry, mutated in place by request handlers
//! - [`SessionBackend`] is the database boundary (read, create, write)
//! - [`SessionStore`] adapts a backend to the cache's load/save contract
//! - [`SessionCache`] is what handlers call; an unknown session id becomes
//!   a fresh session instead of an error

mod backend;
mod cache;
mod error;
mod session;
mod store;

pub use backend::{MemoryBackend, SessionBackend};
pub use cache::SessionCache;
pub use error::{Result, SessionError, StoreError};
pub use session::{Session, SessionRecord};
pub use store::SessionStore;
