use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounds for a single page of the backing listing. `offset` counts entities,
/// not pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBounds {
    pub offset: u64,
    pub size: u32,
}

impl PageBounds {
    pub fn first(size: u32) -> Self {
        PageBounds { offset: 0, size }
    }
}

/// One page of the entity universe, shaped like the paginated REST payload it
/// typically comes from (`content` is accepted as an alias for `items`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPage<Value> {
    #[serde(alias = "content")]
    pub items: Vec<Value>,

    /// Total population the source holds, across all pages.
    pub total_elements: u64,
}

/// Error surfaced from a bulk load. `Clone` so a single failure can be
/// delivered to every caller attached to the same in-flight load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The backing source failed. Propagated verbatim to callers; the cache
    /// never retries on its own.
    #[error("backing fetch failed: {message}")]
    Backing {
        status: Option<u16>,
        message: String,
    },

    /// The source reported more entities than it ever returned and the page
    /// loop could not make progress.
    #[error("backing source reported {expected} entities but stopped after {got}")]
    TruncatedListing { expected: u64, got: u64 },
}

/// The backing collaborator the cache fronts: a bulk "list entities"
/// operation plus a way to tell which key an entity is stored under.
#[async_trait]
pub trait SourceOfRecord<Key, Value>: Send + Sync {
    /// Fetch one page of the entity universe.
    async fn fetch_page(&self, bounds: PageBounds) -> Result<EntityPage<Value>, FetchError>;

    /// The cache key for an entity. Entities without a usable key are skipped
    /// during hydration rather than treated as errors.
    fn key_of(&self, value: &Value) -> Option<Key>;
}
