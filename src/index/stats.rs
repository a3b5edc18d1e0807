//! Index statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::distance::DistanceMetric;

/// Configuration plus fullness counters, for monitoring drift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub namespace: String,
    pub dim: usize,
    pub num_perm: usize,
    pub rows_per_band: usize,
    pub num_bands: usize,
    pub seed: u64,
    pub metric: DistanceMetric,
    /// Stored payloads. Read from the store, so it survives restarts.
    pub indexed_items: u64,
    /// Buckets holding at least one id. Read from the store.
    pub nonempty_buckets: u64,
    /// Queries served by this process since open or the last `clear()`.
    pub queries: u64,
    /// Candidates re-ranked by this process since open or the last `clear()`.
    pub candidates_examined: u64,
}

impl IndexStats {
    /// Mean ids per non-empty bucket, assuming each item sits in
    /// `num_bands` buckets.
    pub fn mean_bucket_fill(&self) -> f64 {
        if self.nonempty_buckets == 0 {
            return 0.0;
        }
        (self.indexed_items as f64 * self.num_bands as f64) / self.nonempty_buckets as f64
    }

    /// Mean candidates per query.
    pub fn mean_candidates(&self) -> f64 {
        if self.queries == 0 {
            return 0.0;
        }
        self.candidates_examined as f64 / self.queries as f64
    }
}

/// Process-local counters.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    queries: AtomicU64,
    candidates: AtomicU64,
}

impl Counters {
    pub(crate) fn record_query(&self, candidates: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.candidates
            .fetch_add(candidates as u64, Ordering::Relaxed);
    }

    pub(crate) fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub(crate) fn candidates(&self) -> u64 {
        self.candidates.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.candidates.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let c = Counters::default();
        c.record_query(10);
        c.record_query(30);
        assert_eq!(c.queries(), 2);
        assert_eq!(c.candidates(), 40);
        c.reset();
        assert_eq!(c.queries(), 0);
        assert_eq!(c.candidates(), 0);
    }

    #[test]
    fn derived_ratios_handle_empty_index() {
        let stats = IndexStats {
            namespace: "t".into(),
            dim: 4,
            num_perm: 8,
            rows_per_band: 4,
            num_bands: 2,
            seed: 0,
            metric: DistanceMetric::L2,
            indexed_items: 0,
            nonempty_buckets: 0,
            queries: 0,
            candidates_examined: 0,
        };
        assert_eq!(stats.mean_bucket_fill(), 0.0);
        assert_eq!(stats.mean_candidates(), 0.0);
    }
}
