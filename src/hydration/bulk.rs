use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, debug_span, warn, Instrument};

use crate::hydration::CacheHydrationStrategy;
use crate::source_of_record::{FetchError, PageBounds, SourceOfRecord};
use crate::store::CacheStoreStrategy;

/// Default page size for the bulk load, matching the ceiling of the upstream
/// listing endpoints this cache was built against.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

type SharedLoad = Shared<BoxFuture<'static, Result<(), FetchError>>>;

struct HydratorState<Key, Value> {
    store: Box<dyn CacheStoreStrategy<Key, Value>>,
    all_loaded: bool,
    in_flight: Option<SharedLoad>,
    epoch: u64,
}

/// Pulls the whole entity universe from the source of record in one coalesced,
/// paged load and memoizes it in the store.
///
/// The "is a load already running?" decision is a synchronous check-and-set
/// under the state lock, taken before any suspension, so at most one load is
/// outstanding at any time; callers arriving while one is in flight clone the
/// same shared future and await its single outcome. The lock is never held
/// across an await.
///
/// Every load carries the epoch current when it started. `flush` bumps the
/// epoch, so a load that settles after a flush discards its results instead of
/// silently repopulating the cleared store.
pub struct BulkLoadHydrator<Key, Value> {
    state: Arc<Mutex<HydratorState<Key, Value>>>,
    source: Arc<dyn SourceOfRecord<Key, Value>>,
    page_size: u32,
}

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<Key, Value> BulkLoadHydrator<Key, Value>
where
    Key: Eq + Hash + Clone + Send + Sync + 'static,
    Value: Clone + Send + Sync + 'static,
{
    pub fn new(
        store: Box<dyn CacheStoreStrategy<Key, Value>>,
        source: Arc<dyn SourceOfRecord<Key, Value>>,
    ) -> Self {
        Self::with_page_size(store, source, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(
        store: Box<dyn CacheStoreStrategy<Key, Value>>,
        source: Arc<dyn SourceOfRecord<Key, Value>>,
        page_size: u32,
    ) -> Self {
        BulkLoadHydrator {
            state: Arc::new(Mutex::new(HydratorState {
                store,
                all_loaded: false,
                in_flight: None,
                epoch: 0,
            })),
            source,
            page_size,
        }
    }

    fn start_load(
        source: Arc<dyn SourceOfRecord<Key, Value>>,
        state: Arc<Mutex<HydratorState<Key, Value>>>,
        epoch: u64,
        page_size: u32,
    ) -> SharedLoad {
        let span = debug_span!("bulk_load", epoch);
        async move {
            let outcome = Self::fetch_universe(&source, page_size).await;

            let mut state = lock(&state);
            if state.epoch != epoch {
                // A flush happened while we were in flight; this snapshot is
                // no longer authoritative and the handle slot belongs to the
                // new epoch now.
                warn!(current = state.epoch, "discarding results of stale bulk load");
                return outcome.map(|_| ());
            }

            state.in_flight = None;
            let entities = outcome?;
            for (key, value) in entities {
                state.store.put(&key, value);
            }
            state.all_loaded = true;
            debug!(resident = state.store.len(), "bulk load complete");
            Ok(())
        }
        .instrument(span)
        .boxed()
        .shared()
    }

    /// Page through the listing until the reported total is reached. Entities
    /// the source returns without a usable key are skipped.
    async fn fetch_universe(
        source: &Arc<dyn SourceOfRecord<Key, Value>>,
        page_size: u32,
    ) -> Result<Vec<(Key, Value)>, FetchError> {
        let mut entities = Vec::new();
        let mut offset = 0u64;

        loop {
            let page = source.fetch_page(PageBounds { offset, size: page_size }).await?;
            let got = page.items.len() as u64;

            for value in page.items {
                if let Some(key) = source.key_of(&value) {
                    entities.push((key, value));
                }
            }

            offset += got;
            if offset >= page.total_elements {
                return Ok(entities);
            }
            if got == 0 {
                return Err(FetchError::TruncatedListing {
                    expected: page.total_elements,
                    got: offset,
                });
            }
        }
    }
}

#[async_trait]
impl<Key, Value> CacheHydrationStrategy<Key, Value> for BulkLoadHydrator<Key, Value>
where
    Key: Eq + Hash + Clone + Send + Sync + 'static,
    Value: Clone + Send + Sync + 'static,
{
    fn peek(&self, key: &Key) -> Option<Value> {
        lock(&self.state).store.get(key)
    }

    fn peek_many(&self, keys: &[Key]) -> HashMap<Key, Value> {
        let state = lock(&self.state);
        keys.iter()
            .filter_map(|key| state.store.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    async fn ensure_loaded(&self) -> Result<(), FetchError> {
        let load = {
            let mut state = lock(&self.state);
            if state.all_loaded {
                return Ok(());
            }

            match &state.in_flight {
                Some(load) => {
                    debug!("attaching to in-flight bulk load");
                    load.clone()
                }
                None => {
                    let load = Self::start_load(
                        Arc::clone(&self.source),
                        Arc::clone(&self.state),
                        state.epoch,
                        self.page_size,
                    );
                    state.in_flight = Some(load.clone());
                    load
                }
            }
        };

        load.await
    }

    fn flush(&self) {
        let mut state = lock(&self.state);
        state.store.flush();
        state.all_loaded = false;
        state.in_flight = None;
        state.epoch += 1;
        debug!(epoch = state.epoch, "cache flushed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::source_of_record::EntityPage;
    use crate::store::memory::MemoryStore;

    struct TestSource {
        universe: Vec<(String, u32)>,
        calls: AtomicUsize,
        failures: AtomicUsize,
        delay: Option<Duration>,
        reported_total: Option<u64>,
    }

    impl TestSource {
        fn new(universe: Vec<(&str, u32)>) -> Self {
            TestSource {
                universe: universe
                    .into_iter()
                    .map(|(id, v)| (id.to_string(), v))
                    .collect(),
                calls: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                delay: None,
                reported_total: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceOfRecord<String, (String, u32)> for TestSource {
        async fn fetch_page(
            &self,
            bounds: PageBounds,
        ) -> Result<EntityPage<(String, u32)>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(FetchError::Backing {
                    status: Some(500),
                    message: "listing unavailable".into(),
                });
            }

            let start = (bounds.offset as usize).min(self.universe.len());
            let end = (start + bounds.size as usize).min(self.universe.len());
            Ok(EntityPage {
                items: self.universe[start..end].to_vec(),
                total_elements: self
                    .reported_total
                    .unwrap_or(self.universe.len() as u64),
            })
        }

        fn key_of(&self, value: &(String, u32)) -> Option<String> {
            if value.0.is_empty() {
                None
            } else {
                Some(value.0.clone())
            }
        }
    }

    fn hydrator(source: Arc<TestSource>, page_size: u32) -> BulkLoadHydrator<String, (String, u32)> {
        BulkLoadHydrator::with_page_size(Box::new(MemoryStore::new()), source, page_size)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_load() {
        let source = Arc::new(TestSource {
            delay: Some(Duration::from_millis(10)),
            ..TestSource::new(vec![("a", 1), ("b", 2), ("c", 3)])
        });
        let hydrator = hydrator(Arc::clone(&source), 1000);

        let (r1, r2, r3) = futures::join!(
            hydrator.ensure_loaded(),
            hydrator.ensure_loaded(),
            hydrator.ensure_loaded()
        );

        assert!(r1.is_ok() && r2.is_ok() && r3.is_ok());
        assert_eq!(source.calls(), 1);
        assert_eq!(hydrator.peek(&"b".to_string()), Some(("b".to_string(), 2)));
    }

    #[tokio::test]
    async fn already_loaded_short_circuits() {
        let source = Arc::new(TestSource::new(vec![("a", 1)]));
        let hydrator = hydrator(Arc::clone(&source), 1000);

        hydrator.ensure_loaded().await.unwrap();
        hydrator.ensure_loaded().await.unwrap();

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn failure_leaves_store_untouched_and_next_call_retries() {
        let source = Arc::new(TestSource {
            failures: AtomicUsize::new(1),
            ..TestSource::new(vec![("a", 1), ("b", 2)])
        });
        let hydrator = hydrator(Arc::clone(&source), 1000);

        let err = hydrator.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, FetchError::Backing { status: Some(500), .. }));
        assert_eq!(hydrator.peek(&"a".to_string()), None);
        assert_eq!(source.calls(), 1);

        hydrator.ensure_loaded().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(hydrator.peek(&"a".to_string()), Some(("a".to_string(), 1)));
    }

    #[tokio::test]
    async fn pages_to_exhaustion() {
        let universe: Vec<(String, u32)> = (0..12).map(|i| (format!("id-{i}"), i)).collect();
        let source = Arc::new(TestSource {
            universe: universe.clone(),
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            delay: None,
            reported_total: None,
        });
        let hydrator = hydrator(Arc::clone(&source), 5);

        hydrator.ensure_loaded().await.unwrap();

        assert_eq!(source.calls(), 3);
        for (id, v) in &universe {
            assert_eq!(hydrator.peek(id), Some((id.clone(), *v)));
        }
    }

    #[tokio::test]
    async fn truncated_listing_is_an_error() {
        let source = Arc::new(TestSource {
            reported_total: Some(7),
            ..TestSource::new(vec![("a", 1), ("b", 2)])
        });
        let hydrator = hydrator(Arc::clone(&source), 1000);

        let err = hydrator.ensure_loaded().await.unwrap_err();
        assert_eq!(err, FetchError::TruncatedListing { expected: 7, got: 2 });
        assert_eq!(hydrator.peek(&"a".to_string()), None);
    }

    #[tokio::test]
    async fn entities_without_keys_are_skipped() {
        let source = Arc::new(TestSource::new(vec![("a", 1), ("", 2), ("c", 3)]));
        let hydrator = hydrator(Arc::clone(&source), 1000);

        hydrator.ensure_loaded().await.unwrap();

        assert_eq!(hydrator.peek(&"a".to_string()), Some(("a".to_string(), 1)));
        assert_eq!(hydrator.peek(&"".to_string()), None);
        assert_eq!(hydrator.peek(&"c".to_string()), Some(("c".to_string(), 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_discards_results_of_load_in_flight() {
        let source = Arc::new(TestSource {
            delay: Some(Duration::from_millis(10)),
            ..TestSource::new(vec![("a", 1)])
        });
        let hydrator = Arc::new(hydrator(Arc::clone(&source), 1000));

        let task = tokio::spawn({
            let hydrator = Arc::clone(&hydrator);
            async move { hydrator.ensure_loaded().await }
        });

        // Let the load reach its suspension point, then invalidate under it.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(source.calls(), 1);
        hydrator.flush();

        task.await.unwrap().unwrap();
        assert_eq!(hydrator.peek(&"a".to_string()), None);

        // The stale load did not mark the universe loaded, so the next caller
        // fetches fresh.
        hydrator.ensure_loaded().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(hydrator.peek(&"a".to_string()), Some(("a".to_string(), 1)));
    }
}
