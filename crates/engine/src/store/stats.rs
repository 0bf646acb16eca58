//! Store counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::CacheStats;

/// Running counters, updated lock-free from every mutation path.
#[derive(Debug, Default)]
pub(crate) struct StoreStats {
    pub appended: AtomicU64,
    pub updated: AtomicU64,
    pub streamed_chunks: AtomicU64,
    pub reassignments: AtomicU64,
    pub recomputations: AtomicU64,
    pub resolutions: AtomicU64,
    pub classifier_failures: AtomicU64,
    pub unknown_ids: AtomicU64,
    pub clears: AtomicU64,
    pub hydrations: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn add(counter: &AtomicU64, n: usize) {
    counter.fetch_add(n as u64, Ordering::Relaxed);
}

/// A point-in-time copy of the store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub appended: u64,
    pub updated: u64,
    pub streamed_chunks: u64,
    pub reassignments: u64,
    pub recomputations: u64,
    /// Messages resolved by closure propagation.
    pub resolutions: u64,
    pub classifier_failures: u64,
    /// Operations addressed to a message id the store does not hold.
    pub unknown_ids: u64,
    pub clears: u64,
    pub hydrations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl StoreStats {
    pub fn snapshot(&self, cache: CacheStats) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            appended: load(&self.appended),
            updated: load(&self.updated),
            streamed_chunks: load(&self.streamed_chunks),
            reassignments: load(&self.reassignments),
            recomputations: load(&self.recomputations),
            resolutions: load(&self.resolutions),
            classifier_failures: load(&self.classifier_failures),
            unknown_ids: load(&self.unknown_ids),
            clears: load(&self.clears),
            hydrations: load(&self.hydrations),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
        }
    }
}
