//! Locality sensitive hashing for dense vectors.
//!
//! LSH inverts the usual goal of a hash function: similar inputs are meant to
//! collide. Two pieces turn an embedding into bucket keys:
//!
//! 1. [`HyperplaneProjector`] maps a vector to a `num_perm`-bit [`Signature`],
//!    one bit per random hyperplane.
//! 2. [`BandPartitioner`] cuts the signature into bands of `rows_per_band`
//!    bits and hashes each band. Band `b` with hash `h` names one bucket.
//!
//! ```rust
//! use vicinity_lsh::hash::{BandPartitioner, HyperplaneProjector};
//!
//! let projector = HyperplaneProjector::new(4, 16, 42).unwrap();
//! let bands = BandPartitioner::new(16, 4).unwrap();
//!
//! let sig = projector.compute_signature(&[0.1, -0.4, 0.9, 0.0]).unwrap();
//! let keys = bands.band_hashes(&sig);
//! assert_eq!(keys.len(), 4);
//! assert!(keys.iter().all(|&h| h < 16));
//! ```
//!
//! ## References
//!
//! - Indyk & Motwani (1998). "Approximate nearest neighbors: towards removing
//!   the curse of dimensionality."
//! - Charikar (2002). "Similarity estimation techniques from rounding algorithms."
//! - Leskovec, Rajaraman & Ullman. "Mining of Massive Datasets", ch. 3 (banding).

mod banding;
mod projection;

pub use banding::BandPartitioner;
pub use projection::{HyperplaneProjector, Signature};
