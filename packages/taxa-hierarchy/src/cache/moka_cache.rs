//! In-process result cache on moka
//!
//! Every entry carries the TTL it was stored with; moka drops it once that
//! elapses. There is no invalidation on write.

use moka::sync::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::CacheResult;
use super::ResultCache;
use crate::config::CacheSettings;

#[derive(Clone)]
struct CachedBytes {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedBytes> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedBytes,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedBytes,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MokaResultCache {
    cache: Cache<String, CachedBytes>,
}

impl MokaResultCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .eviction_listener(|key, _value, cause| {
                tracing::debug!("Result cache evicted {} (cause: {:?})", key, cause);
            })
            .build();
        Self { cache }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.max_entries)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }
}

impl ResultCache for MokaResultCache {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.cache.get(key).map(|entry| entry.bytes.to_vec()))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.cache.insert(
            key.to_string(),
            CachedBytes {
                bytes: Arc::from(value),
                ttl,
            },
        );
        Ok(())
    }
}
