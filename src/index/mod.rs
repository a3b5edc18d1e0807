//! The LSH index engine.
//!
//! [`LshIndex`] ties the pieces together:
//!
//! ```text
//!  index(ids, vectors)                 get_top_k(query, k)
//!        │                                   │
//!        ▼                                   ▼
//!  HyperplaneProjector ──► Signature ◄── HyperplaneProjector
//!        │                                   │
//!        ▼                                   ▼
//!  BandPartitioner ──► (band, hash)*  BandPartitioner
//!        │                                   │
//!        ▼                                   ▼
//!  BucketStore: SADD + SET            BucketStore: SSCAN per band
//!                                            │ union
//!                                            ▼
//!                                     MGET payloads → exact distance → top k
//! ```
//!
//! # Lifecycle
//!
//! [`LshIndex::open`] validates the configuration and reconciles it with the
//! namespace's persisted meta blob; after that the index is ready and stays
//! ready. [`LshIndex::clear`] empties the namespace but keeps it bound to
//! the same parameters. Store failures are reported per call and never
//! change the index's state.
//!
//! # Concurrency
//!
//! `LshIndex` is `Send + Sync`; share it behind an `Arc`. Batch work runs on
//! the index's own worker pool (`workers` threads). Writes to the same id are
//! serialized, both within a batch and across concurrent calls; writes to
//! different ids proceed in parallel.

mod ingest;
mod query;
mod report;
mod stats;

pub use query::Neighbor;
pub use report::{BatchReport, IndexAction, IndexReport, ItemOutcome, RemoveAction, RemoveReport};
pub use stats::IndexStats;

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::codec::VectorCodec;
use crate::config::{IndexMeta, LshConfig};
use crate::error::{LshError, Result};
use crate::hash::{BandPartitioner, HyperplaneProjector, Signature};
use crate::store::{BucketStore, MemoryStore};
use crate::VectorId;
use stats::Counters;

/// Number of striped per-id write locks.
const ID_LOCK_STRIPES: usize = 256;

/// Serializes writes to the same id.
///
/// Ids hash onto a fixed set of mutexes; two ids sharing a stripe merely
/// wait for each other. A thread holds at most one stripe at a time.
struct IdLocks {
    stripes: Box<[Mutex<()>]>,
}

impl IdLocks {
    fn new(n: usize) -> Self {
        Self {
            stripes: (0..n).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, id: VectorId) -> MutexGuard<'_, ()> {
        // Fibonacci hashing spreads sequential ids across stripes.
        let h = id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        self.stripes[(h >> 32) as usize % self.stripes.len()].lock()
    }
}

/// Random-hyperplane LSH index over a [`BucketStore`].
pub struct LshIndex<S> {
    config: LshConfig,
    seed: u64,
    projector: HyperplaneProjector,
    partitioner: BandPartitioner,
    codec: VectorCodec,
    store: S,
    pool: ThreadPool,
    id_locks: IdLocks,
    counters: Counters,
}

impl<S: BucketStore> LshIndex<S> {
    /// Open (or create) the index for `config.namespace` on `store`.
    ///
    /// A fresh namespace persists its parameters, generating a seed if
    /// `config.seed` is `None`. An existing namespace must match the
    /// persisted `dim`, `num_perm`, `rows_per_band`, metric and (if given)
    /// seed, or this fails with [`LshError::StorageInconsistent`].
    pub fn open(config: LshConfig, store: S) -> Result<Self> {
        config.validate()?;
        if store.keyspace().prefix() != config.namespace {
            return Err(LshError::invalid(format!(
                "store is bound to namespace {:?} but config names {:?}",
                store.keyspace().prefix(),
                config.namespace
            )));
        }

        let seed = Self::reconcile_meta(&config, &store)?;

        let projector = HyperplaneProjector::new(config.dim, config.num_perm, seed)?;
        let partitioner = BandPartitioner::new(config.num_perm, config.rows_per_band)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("lsh-worker-{i}"))
            .build()
            .map_err(|e| LshError::invalid(format!("failed to start worker pool: {e}")))?;

        info!(
            namespace = %config.namespace,
            dim = config.dim,
            num_perm = config.num_perm,
            rows_per_band = config.rows_per_band,
            num_bands = partitioner.band_count(),
            seed,
            metric = config.metric.name(),
            workers = config.workers,
            "opened lsh index"
        );

        Ok(Self {
            codec: VectorCodec::new(config.dim),
            config,
            seed,
            projector,
            partitioner,
            store,
            pool,
            id_locks: IdLocks::new(ID_LOCK_STRIPES),
            counters: Counters::default(),
        })
    }

    /// Read or create the namespace's meta blob. Returns the seed to use.
    fn reconcile_meta(config: &LshConfig, store: &S) -> Result<u64> {
        if let Some(bytes) = store.get_meta()? {
            return IndexMeta::from_bytes(&bytes)?.reconcile(config);
        }

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let meta = IndexMeta::from_config(config, seed);
        if store.put_meta_if_absent(&meta.to_bytes()?)? {
            debug!(namespace = %config.namespace, seed, "created namespace meta");
            return Ok(seed);
        }

        // Another process created the namespace between our read and write.
        let bytes = store.get_meta()?.ok_or_else(|| {
            LshError::inconsistent("meta blob vanished while creating namespace")
        })?;
        IndexMeta::from_bytes(&bytes)?.reconcile(config)
    }

    /// Store-reported counts plus configuration.
    pub fn stats(&self) -> Result<IndexStats> {
        let counts = self.store.counts()?;
        Ok(IndexStats {
            namespace: self.config.namespace.clone(),
            dim: self.config.dim,
            num_perm: self.config.num_perm,
            rows_per_band: self.config.rows_per_band,
            num_bands: self.partitioner.band_count(),
            seed: self.seed,
            metric: self.config.metric,
            indexed_items: counts.vectors,
            nonempty_buckets: counts.buckets,
            queries: self.counters.queries(),
            candidates_examined: self.counters.candidates(),
        })
    }

    /// Delete every key in the namespace. Irreversible.
    ///
    /// The namespace stays bound to this index's parameters: the meta blob
    /// is rewritten after the wipe.
    pub fn clear(&self) -> Result<()> {
        let deleted = self.store.clear_namespace()?;
        let meta = IndexMeta::from_config(&self.config, self.seed);
        self.store.put_meta(&meta.to_bytes()?)?;
        self.counters.reset();
        info!(namespace = %self.config.namespace, deleted, "cleared lsh index");
        Ok(())
    }

    /// The stored embedding for `id`.
    pub fn get_vector(&self, id: VectorId) -> Result<Vec<f32>> {
        match self.store.get_vector(id)? {
            Some(bytes) => self.codec.decode(&bytes),
            None => Err(LshError::NotFound(id)),
        }
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: VectorId) -> Result<bool> {
        Ok(self.store.get_vector(id)?.is_some())
    }

    pub fn config(&self) -> &LshConfig {
        &self.config
    }

    /// Hyperplane seed in effect (persisted or supplied).
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn projector(&self) -> &HyperplaneProjector {
        &self.projector
    }

    pub fn partitioner(&self) -> &BandPartitioner {
        &self.partitioner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// `(band, hash)` for every band of `signature`, in band order.
    fn buckets_of(&self, signature: &Signature) -> Vec<(usize, u64)> {
        self.partitioner
            .band_hashes(signature)
            .into_iter()
            .enumerate()
            .collect()
    }

    fn check_dim(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.config.dim {
            return Err(LshError::DimensionMismatch {
                expected: self.config.dim,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl LshIndex<MemoryStore> {
    /// Open over a fresh private in-process store.
    pub fn in_memory(config: LshConfig) -> Result<Self> {
        let store = MemoryStore::new(config.namespace.clone());
        Self::open(config, store)
    }
}

#[cfg(feature = "redis")]
impl LshIndex<crate::store::RedisStore> {
    /// Connect to the store named by `config.store` and open the namespace.
    ///
    /// Connections are released when the index is dropped.
    pub fn connect(config: LshConfig) -> Result<Self> {
        config.validate()?;
        let store = crate::store::RedisStore::connect(&config.store, config.namespace.clone())?;
        Self::open(config, store)
    }
}

impl<S> std::fmt::Debug for LshIndex<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LshIndex")
            .field("namespace", &self.config.namespace)
            .field("dim", &self.config.dim)
            .field("num_perm", &self.config.num_perm)
            .field("rows_per_band", &self.config.rows_per_band)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;


    fn config() -> LshConfig {
        LshConfig::new(8)
            .with_bands(32, 4)
            .with_namespace("unit")
            .with_workers(2)
    }

    #[test]
    fn open_persists_generated_seed() {
        let store = MemoryStore::new("unit");
        let backend = store.backend().clone();
        let first = LshIndex::open(config(), store).unwrap();

        let reopened =
            LshIndex::open(config(), MemoryStore::with_backend(backend, "unit")).unwrap();
        assert_eq!(first.seed(), reopened.seed());
    }

    #[test]
    fn open_rejects_namespace_mismatch() {
        let err = LshIndex::open(config(), MemoryStore::new("other")).unwrap_err();
        assert!(matches!(err, LshError::InvalidArgument(_)));
    }

    #[test]
    fn open_rejects_corrupt_meta() {
        let store = MemoryStore::new("unit");
        store.put_meta(b"{not json").unwrap();
        let err = LshIndex::open(config(), store).unwrap_err();
        assert!(matches!(err, LshError::StorageInconsistent(_)));
    }

    #[test]
    fn id_locks_release_on_drop() {
        let locks = IdLocks::new(4);
        for id in 0..100 {
            let _g = locks.lock(id);
        }
    }

    #[test]
    fn get_vector_not_found() {
        let index = LshIndex::open(config(), MemoryStore::new("unit")).unwrap();
        assert_eq!(index.get_vector(5).unwrap_err(), LshError::NotFound(5));
        assert!(!index.contains(5).unwrap());
    }
}
