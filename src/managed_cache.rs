use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::hydration::bulk::BulkLoadHydrator;
use crate::hydration::CacheHydrationStrategy;
use crate::source_of_record::{FetchError, SourceOfRecord};
use crate::store::memory::MemoryStore;

/// Caller-facing cache facade.
///
/// One instance per logical session fronts one entity universe; clones share
/// the same underlying cache. Callers resolve entity references through
/// [`request_many`](Self::request_many) and must check for key presence in the
/// returned map: keys the source does not know are omitted, never an error.
pub struct EntityCache<Key, Value> {
    hydrator: Arc<dyn CacheHydrationStrategy<Key, Value>>,
}

impl<Key, Value> Clone for EntityCache<Key, Value> {
    fn clone(&self) -> Self {
        EntityCache {
            hydrator: Arc::clone(&self.hydrator),
        }
    }
}

impl<Key, Value> EntityCache<Key, Value>
where
    Key: Eq + Hash + Clone + Send + Sync + 'static,
    Value: Clone + Send + Sync + 'static,
{
    pub fn new(hydrator: Arc<dyn CacheHydrationStrategy<Key, Value>>) -> Self {
        EntityCache { hydrator }
    }

    /// Convenience constructor: in-memory store, bulk-load hydration with the
    /// default page size.
    pub fn with_source(source: Arc<dyn SourceOfRecord<Key, Value>>) -> Self {
        Self::new(Arc::new(BulkLoadHydrator::new(
            Box::new(MemoryStore::new()),
            source,
        )))
    }

    /// Read a single cached entity. Never triggers I/O.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.hydrator.peek(key)
    }

    /// Synchronous read of whatever subset of `ids` is currently resident.
    /// Never triggers I/O; callers must not assume completeness.
    pub fn lookup<I>(&self, ids: I) -> HashMap<Key, Value>
    where
        I: IntoIterator<Item = Key>,
    {
        self.hydrator.peek_many(&dedupe(ids))
    }

    /// Resolve `ids` to entities, fetching from the backing source at most
    /// once.
    ///
    /// Duplicates in `ids` are collapsed before anything else happens. If
    /// every requested key is already resident the call completes from memory
    /// with no I/O. Otherwise it waits for the coalesced bulk load and returns
    /// the union of what was cached up front and the newly loaded entities
    /// that were requested. An empty `ids` resolves to an empty map.
    pub async fn request_many<I>(&self, ids: I) -> Result<HashMap<Key, Value>, FetchError>
    where
        I: IntoIterator<Item = Key>,
    {
        let unique = dedupe(ids);
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let mut resolved = self.hydrator.peek_many(&unique);
        if resolved.len() == unique.len() {
            debug!(keys = unique.len(), "request served entirely from cache");
            return Ok(resolved);
        }

        let missing: Vec<Key> = unique
            .iter()
            .filter(|key| !resolved.contains_key(key))
            .cloned()
            .collect();
        debug!(
            cached = resolved.len(),
            missing = missing.len(),
            "bulk load needed"
        );

        self.hydrator.ensure_loaded().await?;

        resolved.extend(self.hydrator.peek_many(&missing));
        Ok(resolved)
    }

    /// Drop every cached entity. The next request starts a fresh bulk load; a
    /// load already in flight is not cancelled, but its results are discarded.
    pub fn clear_cache(&self) {
        self.hydrator.flush();
    }

    /// Eager warm-up: run the bulk load now if the universe is not already
    /// resident.
    pub async fn preload_all(&self) -> Result<(), FetchError> {
        self.hydrator.ensure_loaded().await
    }
}

fn dedupe<Key, I>(ids: I) -> Vec<Key>
where
    Key: Eq + Hash + Clone,
    I: IntoIterator<Item = Key>,
{
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
