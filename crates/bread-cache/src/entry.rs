/// A value that can live in the cache.
///
/// The only capability the cache needs is a stable string key. Entries are
/// shared as `Arc<Self>` between the cache, its callers and the copy-back
/// worker, so types that are mutated in place should use interior mutability.
pub trait Entry: Send + Sync + 'static {
    /// The key this entry is cached under.
    fn key(&self) -> &str;
}
