//! Query cache statistics

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how the query cache is being used
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    cancellations: AtomicU64,
    invalidations: AtomicU64,
    optimistic_writes: AtomicU64,
    rollbacks: AtomicU64,
    evictions: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $get:ident, $field:ident, $doc:literal) => {
        #[doc = concat!("Record ", $doc)]
        pub fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        #[doc = concat!("Total ", $doc, " recorded")]
        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl CacheStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_hit, hits, hits, "a fresh read served from cache");
    counter!(record_miss, misses, misses, "a read that needed a fetch");
    counter!(record_fetch, fetches, fetches, "a fetch attempt");
    counter!(record_fetch_failure, fetch_failures, fetch_failures, "a failed fetch attempt");
    counter!(record_cancellation, cancellations, cancellations, "a cancelled in-flight fetch");
    counter!(record_invalidation, invalidations, invalidations, "an entry marked stale");
    counter!(record_optimistic_write, optimistic_writes, optimistic_writes, "an optimistic patch");
    counter!(record_rollback, rollbacks, rollbacks, "a projection restored from snapshot");
    counter!(record_eviction, evictions, evictions, "an LRU eviction");

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.fetches,
            &self.fetch_failures,
            &self.cancellations,
            &self.invalidations,
            &self.optimistic_writes,
            &self.rollbacks,
            &self.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cache_hits:{}", self.hits())?;
        writeln!(f, "cache_misses:{}", self.misses())?;
        writeln!(f, "cache_hit_ratio:{:.2}", self.hit_ratio())?;
        writeln!(f, "fetches:{}", self.fetches())?;
        writeln!(f, "fetch_failures:{}", self.fetch_failures())?;
        writeln!(f, "cancellations:{}", self.cancellations())?;
        writeln!(f, "invalidations:{}", self.invalidations())?;
        writeln!(f, "optimistic_writes:{}", self.optimistic_writes())?;
        writeln!(f, "rollbacks:{}", self.rollbacks())?;
        write!(f, "evictions:{}", self.evictions())
    }
}
