//! Payload encoding for stored embeddings.
//!
//! A payload is the embedding's `f32` components in little-endian order,
//! with no header: `dim * 4` bytes. The dimension is fixed per namespace
//! and recorded in the meta blob, so a payload of any other length is
//! corruption.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{LshError, Result};

/// Encodes and decodes embedding payloads of a fixed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorCodec {
    dim: usize,
}

impl VectorCodec {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Payload size in bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.dim * std::mem::size_of::<f32>()
    }

    pub fn encode(&self, embedding: &[f32]) -> Result<Vec<u8>> {
        if embedding.len() != self.dim {
            return Err(LshError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            });
        }
        let mut buf = vec![0u8; self.payload_len()];
        LittleEndian::write_f32_into(embedding, &mut buf);
        Ok(buf)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Vec<f32>> {
        if payload.len() != self.payload_len() {
            return Err(LshError::inconsistent(format!(
                "payload is {} bytes, expected {} for dim {}",
                payload.len(),
                self.payload_len(),
                self.dim
            )));
        }
        let mut out = vec![0f32; self.dim];
        LittleEndian::read_f32_into(payload, &mut out);
        Ok(out)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}
