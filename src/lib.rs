//! A request-coalescing, bulk-loading in-memory entity cache.
//!
//! Components that independently need overlapping sets of entities (by ID)
//! should not each issue their own network calls for them. [`EntityCache`]
//! fronts a paginated "list everything" endpoint: the first request for a
//! missing entity triggers one bulk load of the entity universe, concurrent
//! requests attach to that same in-flight load, and every later request is
//! served from memory until the cache is explicitly cleared.
//!
//! The pieces compose the same way they are layered:
//!
//! - [`SourceOfRecord`] is the backing collaborator: an async, paginated bulk
//!   listing plus a way to extract each entity's key.
//! - [`CacheStoreStrategy`] / [`MemoryStore`] hold the resident entities.
//! - [`BulkLoadHydrator`] pulls the universe from the source into the store,
//!   coalescing concurrent callers onto one shared load and tagging each load
//!   with an epoch so a load that outlives a clear cannot repopulate it.
//! - [`EntityCache`] is the caller-facing facade: deduplicate the requested
//!   IDs, partition into cached and missing, hit the fast path when nothing is
//!   missing, otherwise wait for the coalesced load.
//!
//! Failed loads never populate the store; the error is delivered to every
//! attached caller and the next request starts fresh. Keys the source does not
//! know are omitted from results rather than reported as errors.

pub mod hydration;
pub mod managed_cache;
pub mod source_of_record;
pub mod store;

pub use hydration::bulk::{BulkLoadHydrator, DEFAULT_PAGE_SIZE};
pub use hydration::CacheHydrationStrategy;
pub use managed_cache::EntityCache;
pub use source_of_record::{EntityPage, FetchError, PageBounds, SourceOfRecord};
pub use store::memory::MemoryStore;
pub use store::CacheStoreStrategy;
