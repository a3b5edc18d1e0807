//! Random hyperplane projection (SimHash for dense vectors).
//!
//! Each hyperplane contributes one signature bit:
//!
//! ```text
//! bit[i] = 1  if  dot(v, h_i) >= 0
//!          0  otherwise
//! ```
//!
//! For two vectors at angle θ, `P[bit_i(a) = bit_i(b)] = 1 - θ/π`, so the
//! Hamming distance between signatures estimates angular distance.
//!
//! Hyperplane components are standard-normal draws from a `ChaCha8Rng`
//! seeded with the namespace seed. ChaCha's output stream is fixed for a
//! given seed across `rand_chacha` releases, which is what lets a restarted
//! process rebuild exactly the same hyperplanes and find its old buckets.
//!
//! # References
//!
//! - Charikar (2002). "Similarity estimation techniques from rounding algorithms"

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::error::{LshError, Result};
use crate::simd;

/// A fixed-length bit vector, packed into 64-bit words.
///
/// Bit `i` lives in `words[i / 64]` at position `i % 64`. Bits past `len`
/// in the last word are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    words: Vec<u64>,
    len: usize,
}

impl Signature {
    /// An all-zero signature of `len` bits.
    pub fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// Build a signature from a bit iterator. Bit `i` is the `i`th item.
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0usize;
        for bit in bits {
            if len % 64 == 0 {
                words.push(0u64);
            }
            if bit {
                words[len / 64] |= 1u64 << (len % 64);
            }
            len += 1;
        }
        Self { words, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value of bit `i`. Panics if `i >= len`.
    #[inline]
    pub fn bit(&self, i: usize) -> bool {
        assert!(i < self.len, "bit {i} out of range for {}-bit signature", self.len);
        (self.words[i / 64] >> (i % 64)) & 1 == 1
    }

    #[inline]
    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1u64 << (i % 64);
    }

    /// Packed words, least-significant bit first.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of positions where the two signatures differ.
    ///
    /// Signatures of different lengths are compared over the shorter one.
    pub fn hamming_distance(&self, other: &Signature) -> usize {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones() as usize)
            .sum()
    }

    /// Read `count` bits starting at `start` into a `u64` (bit 0 = `start`).
    ///
    /// `count` must be at most 64 and `start + count <= len`.
    pub(crate) fn extract(&self, start: usize, count: usize) -> u64 {
        debug_assert!(count <= 64);
        debug_assert!(start + count <= self.len);
        if count == 0 {
            return 0;
        }
        let word = start / 64;
        let offset = start % 64;
        let mut value = self.words[word] >> offset;
        if offset != 0 && offset + count > 64 {
            value |= self.words[word + 1] << (64 - offset);
        }
        if count < 64 {
            value &= (1u64 << count) - 1;
        }
        value
    }
}

/// Deterministic set of random hyperplanes.
///
/// Immutable after construction and safe to share across threads.
#[derive(Debug, Clone)]
pub struct HyperplaneProjector {
    dim: usize,
    num_perm: usize,
    seed: u64,
    /// `num_perm` hyperplanes of length `dim`, row-major.
    planes: Vec<f32>,
}

impl HyperplaneProjector {
    /// Draw `num_perm` hyperplanes of length `dim` from `seed`.
    ///
    /// The same `(dim, num_perm, seed)` always produces the same hyperplanes.
    pub fn new(dim: usize, num_perm: usize, seed: u64) -> Result<Self> {
        if dim == 0 {
            return Err(LshError::invalid("dim must be > 0"));
        }
        if num_perm == 0 {
            return Err(LshError::invalid("num_perm must be > 0"));
        }
        let len = dim
            .checked_mul(num_perm)
            .ok_or_else(|| LshError::invalid("dim * num_perm overflows"))?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let planes = (0..len).map(|_| rng.sample::<f32, _>(StandardNormal)).collect();

        Ok(Self {
            dim,
            num_perm,
            seed,
            planes,
        })
    }

    /// Compute the `num_perm`-bit signature of `embedding`.
    pub fn compute_signature(&self, embedding: &[f32]) -> Result<Signature> {
        if embedding.len() != self.dim {
            return Err(LshError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            });
        }

        let mut sig = Signature::zeros(self.num_perm);
        for (i, plane) in self.planes.chunks_exact(self.dim).enumerate() {
            if simd::dot(embedding, plane) >= 0.0 {
                sig.set(i);
            }
        }
        Ok(sig)
    }

    /// Hyperplane `i`.
    pub fn hyperplane(&self, i: usize) -> &[f32] {
        &self.planes[i * self.dim..(i + 1) * self.dim]
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}
