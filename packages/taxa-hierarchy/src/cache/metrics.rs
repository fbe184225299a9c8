//! Prometheus metrics for cached reads

use prometheus::{register_int_counter_with_registry, IntCounter, Opts, Registry};

use super::error::CacheResult;

#[derive(Clone)]
pub struct CacheMetrics {
    pub hits: IntCounter,
    pub misses: IntCounter,
    /// Backend or decode failures that fell through to the reader
    pub errors: IntCounter,
}

impl CacheMetrics {
    pub fn new(registry: &Registry) -> CacheResult<Self> {
        Ok(Self {
            hits: register_int_counter_with_registry!(
                Opts::new("taxa_cache_hits_total", "Cached read hits"),
                registry
            )?,
            misses: register_int_counter_with_registry!(
                Opts::new("taxa_cache_misses_total", "Cached read misses"),
                registry
            )?,
            errors: register_int_counter_with_registry!(
                Opts::new(
                    "taxa_cache_errors_total",
                    "Cache failures answered by the reader"
                ),
                registry
            )?,
        })
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.get() as f64;
        let total = hits + self.misses.get() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}
