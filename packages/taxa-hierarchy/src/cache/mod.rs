//! Result cache in front of the hierarchy reader
//!
//! Only two shapes per partition are cached: the whole collection tree at a
//! given depth and the unfiltered item list for a given page. Anything with a
//! text or node filter goes straight to the reader. The cache is advisory; a
//! miss, a backend failure or an undecodable entry all fall through to the
//! reader.

mod error;
mod metrics;
mod moka_cache;

pub use error::{CacheError, CacheResult};
pub use metrics::CacheMetrics;
pub use moka_cache::MokaResultCache;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use taxa_storage::{CatalogStore, PartitionId};

use crate::errors::Result;
use crate::reader::{CollectionTree, HierarchyReader, ItemListing, ItemSearch, Page};

/// Key/value backend holding JSON-encoded results
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;
}

pub fn collections_key(partition_id: PartitionId, depth: usize) -> String {
    format!("partition:{partition_id}:collections:{depth}")
}

pub fn items_key(partition_id: PartitionId, page: Page) -> String {
    format!(
        "partition:{}:items:{}:{}",
        partition_id, page.limit, page.offset
    )
}

pub struct CachedCatalog<'a, S: CatalogStore + ?Sized, C: ResultCache + ?Sized> {
    reader: HierarchyReader<'a, S>,
    cache: &'a C,
    ttl: Duration,
    metrics: Option<Arc<CacheMetrics>>,
}

impl<'a, S: CatalogStore + ?Sized, C: ResultCache + ?Sized> CachedCatalog<'a, S, C> {
    pub fn new(reader: HierarchyReader<'a, S>, cache: &'a C, ttl: Duration) -> Self {
        Self {
            reader,
            cache,
            ttl,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn list_collections(
        &self,
        partition_id: PartitionId,
        depth: usize,
    ) -> Result<Vec<CollectionTree>> {
        self.cached(&collections_key(partition_id, depth), || {
            self.reader.list_collections(partition_id, depth)
        })
    }

    pub fn list_items(
        &self,
        partition_id: PartitionId,
        search: &ItemSearch,
        page: Page,
    ) -> Result<ItemListing> {
        if !search.is_unfiltered() {
            return self.reader.list_items(partition_id, search, page);
        }
        self.cached(&items_key(partition_id, page), || {
            self.reader.list_items(partition_id, search, page)
        })
    }

    fn cached<T, F>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        match self.cache.get(key) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::debug!("Cache hit: {}", key);
                    self.record(|m| m.hits.inc());
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.record(|m| m.errors.inc());
                }
            },
            Ok(None) => {
                tracing::debug!("Cache miss: {}", key);
                self.record(|m| m.misses.inc());
            }
            Err(e) => {
                tracing::warn!("Cache read failed for {}, using store: {}", key, e);
                self.record(|m| m.errors.inc());
            }
        }

        let value = compute()?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(key, bytes, self.ttl) {
                    tracing::warn!("Cache write failed for {}: {}", key, e);
                    self.record(|m| m.errors.inc());
                }
            }
            Err(e) => tracing::warn!("Could not encode {} for caching: {}", key, e),
        }
        Ok(value)
    }

    fn record(&self, f: impl FnOnce(&CacheMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}
