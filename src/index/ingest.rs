//! Ingestion and removal.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::report::{BatchReport, IndexAction, IndexReport, ItemOutcome, RemoveAction, RemoveReport};
use super::LshIndex;
use crate::error::{LshError, Result};
use crate::store::BucketStore;
use crate::VectorId;

/// Group input positions by id, preserving first-occurrence order and the
/// input order within each group.
fn group_by_id(ids: &[VectorId]) -> Vec<(VectorId, Vec<usize>)> {
    let mut slot: HashMap<VectorId, usize> = HashMap::with_capacity(ids.len());
    let mut groups: Vec<(VectorId, Vec<usize>)> = Vec::new();
    for (pos, &id) in ids.iter().enumerate() {
        match slot.get(&id) {
            Some(&g) => groups[g].1.push(pos),
            None => {
                slot.insert(id, groups.len());
                groups.push((id, vec![pos]));
            }
        }
    }
    groups
}

/// Put per-position results back in input order.
fn into_report<T>(
    ids: &[VectorId],
    results: Vec<Vec<(usize, Result<T>)>>,
) -> BatchReport<T> {
    let mut ordered: Vec<Option<Result<T>>> = (0..ids.len()).map(|_| None).collect();
    for (pos, result) in results.into_iter().flatten() {
        ordered[pos] = Some(result);
    }
    let outcomes = ids
        .iter()
        .zip(ordered)
        .map(|(&id, result)| ItemOutcome {
            id,
            result: result.unwrap_or_else(|| Err(LshError::invalid("item was not processed"))),
        })
        .collect();
    BatchReport { outcomes }
}

impl<S: BucketStore> LshIndex<S> {
    /// Index `vectors[i]` under `ids[i]`.
    ///
    /// Fails as a whole with [`LshError::InvalidArgument`], before any write,
    /// if the slices differ in length. Everything else is reported per item:
    /// a wrong-length embedding fails only its own item with
    /// [`LshError::DimensionMismatch`], and a store failure fails only the
    /// item it hit.
    ///
    /// Re-indexing an existing id purges it from the buckets of its previous
    /// signature before the new payload and memberships are written. If the
    /// same id appears several times in one batch, its items are applied in
    /// input order and the last one wins.
    ///
    /// Memberships for one vector are written band by band and are not
    /// atomic as a group: a concurrent query may see the vector in some
    /// bands but not others until this call returns. Items already written
    /// stay indexed if a later item fails.
    pub fn index<V>(&self, ids: &[VectorId], vectors: &[V]) -> Result<IndexReport>
    where
        V: AsRef<[f32]> + Sync,
    {
        if ids.len() != vectors.len() {
            return Err(LshError::invalid(format!(
                "got {} ids but {} vectors",
                ids.len(),
                vectors.len()
            )));
        }

        let start = Instant::now();
        let groups = group_by_id(ids);
        let results: Vec<Vec<(usize, Result<IndexAction>)>> = self.pool.install(|| {
            groups
                .par_iter()
                .map(|(id, positions)| {
                    positions
                        .iter()
                        .map(|&pos| (pos, self.index_item(*id, vectors[pos].as_ref())))
                        .collect()
                })
                .collect()
        });

        let report = into_report(ids, results);
        for (id, err) in report.failed() {
            if err.is_retryable() {
                warn!(namespace = %self.config.namespace, id, error = %err, "index item failed");
            } else {
                debug!(namespace = %self.config.namespace, id, error = %err, "index item rejected");
            }
        }
        debug!(
            namespace = %self.config.namespace,
            items = ids.len(),
            inserted = report.count(IndexAction::Inserted),
            replaced = report.count(IndexAction::Replaced),
            failed = report.len() - report.succeeded(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "indexed batch"
        );
        Ok(report)
    }

    /// Index a single vector.
    pub fn index_one(&self, id: VectorId, vector: &[f32]) -> Result<IndexAction> {
        self.index_item(id, vector)
    }

    fn index_item(&self, id: VectorId, embedding: &[f32]) -> Result<IndexAction> {
        self.check_dim(embedding)?;
        let signature = self.projector.compute_signature(embedding)?;
        let buckets = self.buckets_of(&signature);
        let payload = self.codec.encode(embedding)?;

        let _guard = self.id_locks.lock(id);

        let action = match self.store.get_vector(id)? {
            Some(previous) => {
                let old = self.codec.decode(&previous)?;
                let old_buckets = self.buckets_of(&self.projector.compute_signature(&old)?);
                // Same band, same hash: the membership stays valid.
                let stale: Vec<(usize, u64)> = old_buckets
                    .into_iter()
                    .zip(buckets.iter())
                    .filter(|(old, new)| old != *new)
                    .map(|(old, _)| old)
                    .collect();
                self.store.remove_members(id, &stale)?;
                IndexAction::Replaced
            }
            None => IndexAction::Inserted,
        };

        self.store.put_vector(id, &payload)?;
        self.store.add_members(id, &buckets)?;
        Ok(action)
    }

    /// Remove `ids` from the index: every bucket membership and the payload.
    ///
    /// Missing ids report [`RemoveAction::Absent`]. Store failures are
    /// reported per item.
    pub fn remove(&self, ids: &[VectorId]) -> Result<RemoveReport> {
        let groups = group_by_id(ids);
        let results: Vec<Vec<(usize, Result<RemoveAction>)>> = self.pool.install(|| {
            groups
                .par_iter()
                .map(|(id, positions)| {
                    positions
                        .iter()
                        .map(|&pos| (pos, self.remove_item(*id)))
                        .collect()
                })
                .collect()
        });

        let report = into_report(ids, results);
        debug!(
            namespace = %self.config.namespace,
            items = ids.len(),
            removed = report.count(RemoveAction::Removed),
            absent = report.count(RemoveAction::Absent),
            failed = report.len() - report.succeeded(),
            "removed batch"
        );
        Ok(report)
    }

    fn remove_item(&self, id: VectorId) -> Result<RemoveAction> {
        let _guard = self.id_locks.lock(id);

        let Some(previous) = self.store.get_vector(id)? else {
            return Ok(RemoveAction::Absent);
        };
        let old = self.codec.decode(&previous)?;
        let buckets = self.buckets_of(&self.projector.compute_signature(&old)?);
        // Memberships first: if this fails the payload still points at them.
        self.store.remove_members(id, &buckets)?;
        self.store.delete_vector(id)?;
        Ok(RemoveAction::Removed)
    }
}
