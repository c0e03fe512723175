pub mod bulk;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::source_of_record::FetchError;

/// Hydration seam: how missing entities get pulled from the source of record
/// into the store.
///
/// Reads (`peek`, `peek_many`) are synchronous and side-effect free; the only
/// suspension point in the whole cache is `ensure_loaded`'s trip to the
/// backing source.
#[async_trait]
pub trait CacheHydrationStrategy<Key, Value>: Send + Sync {
    /// Read a single cached entity. Never triggers I/O.
    fn peek(&self, key: &Key) -> Option<Value>;

    /// Read many cached entities at once; absent keys are omitted from the
    /// result. Never triggers I/O.
    fn peek_many(&self, keys: &[Key]) -> HashMap<Key, Value>;

    /// Make the entity universe resident, coalescing concurrent callers onto
    /// one in-flight load. Completes without I/O if the universe is already
    /// loaded.
    async fn ensure_loaded(&self) -> Result<(), FetchError>;

    /// Drop every cached entity and start a fresh epoch. An in-flight load is
    /// not cancelled, but its results no longer apply.
    fn flush(&self);
}
