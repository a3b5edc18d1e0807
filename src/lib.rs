//! vicinity-lsh: random-hyperplane LSH with buckets in an external store.
//!
//! Vectors are projected onto `num_perm` random hyperplanes to get a binary
//! signature. The signature is cut into bands of `rows_per_band` bits; each
//! band's hash names a bucket, and the vector's id is added to one bucket per
//! band. A query unions the buckets its own signature lands in and re-ranks
//! those candidates by exact distance against the stored payloads.
//!
//! Bucket sets and payloads live in a key-value store (Redis, or an
//! in-process map), so the index is persistent, shared between processes,
//! and scales past a single process's memory.
//!
//! ```rust
//! use vicinity_lsh::{LshConfig, LshIndex, MemoryStore};
//!
//! let config = LshConfig::new(4).with_bands(32, 4).with_namespace("demo").with_seed(1);
//! let index = LshIndex::open(config, MemoryStore::new("demo")).unwrap();
//!
//! let ids = [0, 1, 2];
//! let vectors = [
//!     vec![1.0_f32, 0.0, 0.0, 0.0],
//!     vec![0.0, 1.0, 0.0, 0.0],
//!     vec![0.9, 0.1, 0.0, 0.0],
//! ];
//! let report = index.index(&ids, &vectors).unwrap();
//! assert!(report.is_complete());
//!
//! let hits = index.get_top_k(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
//! assert_eq!(hits[0].id, 0);
//! assert!(hits[0].distance.abs() < 1e-6);
//! ```
//!
//! # Critical Nuances
//!
//! ## Bucket fullness grows with N
//!
//! For fixed band parameters the expected bucket size is proportional to the
//! number of indexed vectors, and query cost is roughly
//! `bucket_size × num_bands` reads plus that many exact distances. Going from
//! 1M to 1B vectors makes every bucket ~1000× fuller. Keep buckets sparse by
//! raising `rows_per_band` (each extra row halves the expected fill for
//! uniformly spread data), and restore recall with more bands.
//! `max_bucket_scan` bounds the worst case per bucket when that is not enough.
//!
//! ## Seeds are part of the data
//!
//! The hyperplanes are derived from the namespace seed. A different seed maps
//! every vector to different buckets, so the seed is persisted in the
//! namespace's meta blob and reopening with another one is refused.
//!
//! ## Writes are not atomic across bands
//!
//! A concurrent query may observe a vector in some of its buckets but not
//! yet others while it is being written. LSH recall is probabilistic anyway;
//! the window closes when `index()` returns.

pub mod codec;
pub mod config;
pub mod distance;
pub mod error;
pub mod hash;
pub mod index;
pub mod simd;
pub mod store;

/// Opaque vector identifier.
pub type VectorId = u64;

pub use config::{IndexMeta, LshConfig, StoreConfig};
pub use distance::DistanceMetric;
pub use error::{LshError, Result};
pub use index::{
    IndexAction, IndexReport, IndexStats, ItemOutcome, LshIndex, Neighbor, RemoveAction,
    RemoveReport,
};
pub use store::{BucketStore, Keyspace, MemoryBackend, MemoryStore, NamespaceCounts};
#[cfg(feature = "redis")]
pub use store::RedisStore;
