//! Band partitioning of signatures.
//!
//! A signature of `num_perm` bits is cut into `b = num_perm / r` contiguous
//! bands of `r` rows. Two vectors become candidates if *any* band matches
//! exactly. With per-bit agreement probability `p = 1 - θ/π`:
//!
//! ```text
//! P[candidate] = 1 - (1 - p^r)^b
//! ```
//!
//! Larger `r` makes buckets sparser (fewer candidates, lower recall); more
//! bands restore recall at the cost of more bucket reads per query.
//!
//! Band hashes never use `std`'s hasher: they are persisted as store keys and
//! must not change between builds.

use super::projection::Signature;
use crate::error::{LshError, Result};

/// Splits signatures into bands and hashes each band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandPartitioner {
    num_perm: usize,
    rows_per_band: usize,
}

impl BandPartitioner {
    /// `rows_per_band` must evenly divide `num_perm`.
    pub fn new(num_perm: usize, rows_per_band: usize) -> Result<Self> {
        if num_perm == 0 || rows_per_band == 0 {
            return Err(LshError::invalid(
                "num_perm and rows_per_band must both be > 0",
            ));
        }
        if num_perm % rows_per_band != 0 {
            return Err(LshError::invalid(format!(
                "rows_per_band ({rows_per_band}) must evenly divide num_perm ({num_perm})"
            )));
        }
        Ok(Self {
            num_perm,
            rows_per_band,
        })
    }

    /// Number of bands.
    #[inline]
    pub fn band_count(&self) -> usize {
        self.num_perm / self.rows_per_band
    }

    #[inline]
    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    /// Hash of band `band_index` of `signature`.
    ///
    /// Bands of up to 64 rows hash to their packed bits. Wider bands fold
    /// their 64-bit chunks through a fixed mixer.
    ///
    /// Panics if `band_index >= band_count()` or the signature length does not
    /// match `num_perm`.
    pub fn band_hash(&self, signature: &Signature, band_index: usize) -> u64 {
        assert_eq!(
            signature.len(),
            self.num_perm,
            "signature has {} bits, partitioner expects {}",
            signature.len(),
            self.num_perm
        );
        assert!(band_index < self.band_count(), "band {band_index} out of range");

        let start = band_index * self.rows_per_band;
        if self.rows_per_band <= 64 {
            return signature.extract(start, self.rows_per_band);
        }

        let mut h = self.rows_per_band as u64;
        let mut offset = 0;
        while offset < self.rows_per_band {
            let take = (self.rows_per_band - offset).min(64);
            h = mix64(h ^ signature.extract(start + offset, take));
            offset += take;
        }
        h
    }

    /// All band hashes, in band order.
    pub fn band_hashes(&self, signature: &Signature) -> Vec<u64> {
        (0..self.band_count())
            .map(|b| self.band_hash(signature, b))
            .collect()
    }

    /// Probability that two vectors at angle `theta` (radians) share at
    /// least one bucket.
    pub fn candidate_probability(&self, theta: f64) -> f64 {
        let p = 1.0 - theta / std::f64::consts::PI;
        1.0 - (1.0 - p.powi(self.rows_per_band as i32)).powi(self.band_count() as i32)
    }
}

/// splitmix64 finalizer.
#[inline]
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(bits: &[u8]) -> Signature {
        Signature::from_bits(bits.iter().map(|&b| b == 1))
    }

    #[test]
    fn rejects_non_divisible() {
        assert!(BandPartitioner::new(10, 3).is_err());
        assert!(BandPartitioner::new(0, 4).is_err());
        assert!(BandPartitioner::new(8, 0).is_err());
        assert_eq!(BandPartitioner::new(256, 4).unwrap().band_count(), 64);
    }

    #[test]
    fn narrow_bands_pack_bits() {
        let bp = BandPartitioner::new(8, 4).unwrap();
        let s = sig(&[1, 0, 1, 1, 0, 0, 0, 1]);
        assert_eq!(bp.band_hash(&s, 0), 0b1101);
        assert_eq!(bp.band_hash(&s, 1), 0b1000);
        assert_eq!(bp.band_hashes(&s), vec![0b1101, 0b1000]);
    }

    #[test]
    fn wide_bands_are_stable_and_sensitive() {
        let bp = BandPartitioner::new(256, 128).unwrap();
        let bits: Vec<bool> = (0..256).map(|i| (i * 7) % 5 == 0).collect();
        let a = Signature::from_bits(bits.iter().copied());
        let h0 = bp.band_hash(&a, 0);
        assert_eq!(h0, bp.band_hash(&a.clone(), 0));

        let mut flipped = bits.clone();
        flipped[100] = !flipped[100];
        let b = Signature::from_bits(flipped);
        assert_ne!(h0, bp.band_hash(&b, 0));
        assert_eq!(bp.band_hash(&a, 1), bp.band_hash(&b, 1));
    }

    #[test]
    fn candidate_probability_bounds() {
        let bp = BandPartitioner::new(256, 4).unwrap();
        assert!((bp.candidate_probability(0.0) - 1.0).abs() < 1e-12);
        assert!(bp.candidate_probability(std::f64::consts::PI).abs() < 1e-12);

        let sparse = BandPartitioner::new(256, 16).unwrap();
        let theta = std::f64::consts::FRAC_PI_2;
        assert!(sparse.candidate_probability(theta) < bp.candidate_probability(theta));
    }
}
