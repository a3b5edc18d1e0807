//! Bucket storage backends.
//!
//! The index keeps no bucket state in process: bucket membership and exact
//! payloads live in a key-value store behind the [`BucketStore`] trait, so
//! several processes can serve one namespace and an index survives restarts.
//!
//! # Key layout
//!
//! ```text
//! {prefix}:band:{band_index}:{band_hash}  -> set of ids
//! {prefix}:vec:{id}                       -> packed f32 payload
//! {prefix}:meta                           -> JSON IndexMeta
//! ```
//!
//! # Consistency
//!
//! Single-key operations are atomic at the store (set add/remove, string
//! set). Nothing is atomic across keys: while a vector is being written, a
//! reader can see it in some bands and not yet in others. For LSH this only
//! perturbs recall for the duration of the write.
//!
//! Backends:
//! - [`MemoryStore`]: in-process, for tests and embedded use
//! - `RedisStore` (feature `redis`): Redis sets and strings over a bounded
//!   connection pool

mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use keys::Keyspace;
pub(crate) use keys::GLOB_META;
pub use memory::{MemoryBackend, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use std::collections::HashSet;
use std::ops::ControlFlow;

use crate::error::Result;
use crate::VectorId;

/// Key counts under one namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceCounts {
    /// Stored payloads, i.e. indexed vectors.
    pub vectors: u64,
    /// Non-empty buckets across all bands.
    pub buckets: u64,
}

/// Persistent bucket and payload storage for one namespace.
///
/// Every method may fail with [`LshError::StorageUnavailable`] when the
/// backend cannot be reached in time.
///
/// [`LshError::StorageUnavailable`]: crate::LshError::StorageUnavailable
pub trait BucketStore: Send + Sync {
    /// The namespace this store reads and writes.
    fn keyspace(&self) -> &Keyspace;

    /// Add `id` to bucket `(band, hash)`. Idempotent.
    fn add_member(&self, band: usize, hash: u64, id: VectorId) -> Result<()>;

    /// Remove `id` from bucket `(band, hash)`. No-op if absent.
    ///
    /// A bucket whose last member is removed ceases to exist.
    fn remove_member(&self, band: usize, hash: u64, id: VectorId) -> Result<()>;

    /// Stream the members of bucket `(band, hash)` in chunks of at most
    /// `batch` ids.
    ///
    /// Returning [`ControlFlow::Break`] from `visit` stops the scan. A
    /// missing bucket visits nothing. Backends may repeat an id across
    /// chunks. The visitor must not call back into the store.
    fn scan_members(
        &self,
        band: usize,
        hash: u64,
        batch: usize,
        visit: &mut dyn FnMut(&[VectorId]) -> ControlFlow<()>,
    ) -> Result<()>;

    /// All members of bucket `(band, hash)`.
    fn get_members(&self, band: usize, hash: u64) -> Result<HashSet<VectorId>> {
        let mut out = HashSet::new();
        self.scan_members(band, hash, 1024, &mut |chunk| {
            out.extend(chunk.iter().copied());
            ControlFlow::Continue(())
        })?;
        Ok(out)
    }

    /// Add `id` to every bucket in `buckets`. Backends may pipeline.
    fn add_members(&self, id: VectorId, buckets: &[(usize, u64)]) -> Result<()> {
        for &(band, hash) in buckets {
            self.add_member(band, hash, id)?;
        }
        Ok(())
    }

    /// Remove `id` from every bucket in `buckets`. Backends may pipeline.
    fn remove_members(&self, id: VectorId, buckets: &[(usize, u64)]) -> Result<()> {
        for &(band, hash) in buckets {
            self.remove_member(band, hash, id)?;
        }
        Ok(())
    }

    /// Store `payload` for `id`, replacing any previous payload.
    fn put_vector(&self, id: VectorId, payload: &[u8]) -> Result<()>;

    fn get_vector(&self, id: VectorId) -> Result<Option<Vec<u8>>>;

    /// Payloads for `ids`, in order. Backends may batch.
    fn get_vectors(&self, ids: &[VectorId]) -> Result<Vec<Option<Vec<u8>>>> {
        ids.iter().map(|&id| self.get_vector(id)).collect()
    }

    /// Delete the payload for `id`. Returns whether it existed.
    fn delete_vector(&self, id: VectorId) -> Result<bool>;

    /// Store the meta blob, replacing any previous one.
    fn put_meta(&self, blob: &[u8]) -> Result<()>;

    /// Store the meta blob only if none exists. Returns whether it was
    /// written. Two processes creating the same namespace race here, and
    /// exactly one of them wins.
    fn put_meta_if_absent(&self, blob: &[u8]) -> Result<bool>;

    fn get_meta(&self) -> Result<Option<Vec<u8>>>;

    /// Delete every key under the namespace prefix. Returns the number of
    /// keys deleted.
    fn clear_namespace(&self) -> Result<u64>;

    /// Count payload keys and non-empty bucket keys under the namespace.
    fn counts(&self) -> Result<NamespaceCounts>;
}
