//! Candidate retrieval and exact re-ranking.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use super::LshIndex;
use crate::error::{LshError, Result};
use crate::hash::Signature;
use crate::store::BucketStore;
use crate::VectorId;

/// Payloads fetched per store round trip during re-ranking.
const FETCH_CHUNK: usize = 512;

/// A ranked result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: VectorId,
    pub distance: f32,
}

impl<S: BucketStore> LshIndex<S> {
    /// The `k` candidates nearest to `query` under the namespace metric.
    ///
    /// Results are sorted by ascending distance, ties by ascending id. An
    /// empty candidate set yields an empty result, not an error; fewer than
    /// `k` candidates yields all of them.
    pub fn get_top_k(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(LshError::invalid("k must be > 0"));
        }
        self.check_dim(query)?;

        let start = Instant::now();
        let signature = self.projector.compute_signature(query)?;
        let mut candidates: Vec<VectorId> = self.collect_candidates(&signature)?.into_iter().collect();
        candidates.sort_unstable();

        let metric = self.config.metric;
        let scored: Vec<Vec<Neighbor>> = self.pool.install(|| {
            candidates
                .par_chunks(FETCH_CHUNK)
                .map(|chunk| {
                    let payloads = self.store.get_vectors(chunk)?;
                    let mut out = Vec::with_capacity(chunk.len());
                    for (&id, payload) in chunk.iter().zip(payloads) {
                        // Removed between bucket scan and payload fetch.
                        let Some(bytes) = payload else { continue };
                        let vector = self.codec.decode(&bytes)?;
                        out.push(Neighbor {
                            id,
                            distance: metric.distance(query, &vector),
                        });
                    }
                    Ok(out)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut results: Vec<Neighbor> = scored.into_iter().flatten().collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        results.truncate(k);

        self.counters.record_query(candidates.len());
        debug!(
            namespace = %self.config.namespace,
            candidates = candidates.len(),
            returned = results.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "top-k query"
        );
        Ok(results)
    }

    /// Union of the buckets `query` falls into, without re-ranking.
    pub fn candidates(&self, query: &[f32]) -> Result<HashSet<VectorId>> {
        self.check_dim(query)?;
        let signature = self.projector.compute_signature(query)?;
        self.collect_candidates(&signature)
    }

    /// Stream every band's bucket in parallel and union the members.
    ///
    /// With `max_bucket_scan` set, at most that many members are read from
    /// any one bucket.
    fn collect_candidates(&self, signature: &Signature) -> Result<HashSet<VectorId>> {
        let buckets = self.buckets_of(signature);
        let batch = self.config.scan_batch;
        let cap = self.config.max_bucket_scan.unwrap_or(usize::MAX);

        let per_band: Vec<Vec<VectorId>> = self.pool.install(|| {
            buckets
                .par_iter()
                .map(|&(band, hash)| {
                    let mut members = Vec::new();
                    self.store.scan_members(band, hash, batch, &mut |chunk| {
                        let room = cap - members.len();
                        if chunk.len() >= room {
                            members.extend_from_slice(&chunk[..room]);
                            return ControlFlow::Break(());
                        }
                        members.extend_from_slice(chunk);
                        ControlFlow::Continue(())
                    })?;
                    Ok(members)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut candidates = HashSet::with_capacity(per_band.iter().map(Vec::len).sum());
        for members in per_band {
            candidates.extend(members);
        }
        Ok(candidates)
    }
}
