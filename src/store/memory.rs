//! In-process bucket store.
//!
//! Mirrors the Redis key layout on top of a concurrent map, so the same
//! namespace semantics (prefix isolation, empty buckets disappearing,
//! `clear_namespace`) hold in tests and embedded deployments.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{BucketStore, Keyspace, NamespaceCounts};
use crate::error::{LshError, Result};
use crate::VectorId;

#[derive(Debug, Clone)]
enum Value {
    Set(HashSet<VectorId>),
    Bytes(Vec<u8>),
}

fn wrong_type(key: &str) -> LshError {
    LshError::inconsistent(format!("key {key} holds the wrong kind of value"))
}

/// Shared key-value map. One backend can hold many namespaces.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: DashMap<String, Value>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total keys across all namespaces.
    pub fn key_count(&self) -> usize {
        self.map.len()
    }

    /// Whether `key` exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.map
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect()
    }
}

/// [`BucketStore`] over a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    keyspace: Keyspace,
    backend: Arc<MemoryBackend>,
}

impl MemoryStore {
    /// A store over a fresh private backend.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_backend(MemoryBackend::new(), prefix)
    }

    /// A store over an existing backend, e.g. to share it between namespaces.
    pub fn with_backend(backend: Arc<MemoryBackend>, prefix: impl Into<String>) -> Self {
        Self {
            keyspace: Keyspace::new(prefix),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<MemoryBackend> {
        &self.backend
    }

    fn put_bytes(&self, key: String, bytes: &[u8]) {
        self.backend.map.insert(key, Value::Bytes(bytes.to_vec()));
    }

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.backend.map.get(key) {
            None => Ok(None),
            Some(v) => match v.value() {
                Value::Bytes(b) => Ok(Some(b.clone())),
                Value::Set(_) => Err(wrong_type(key)),
            },
        }
    }
}

impl BucketStore for MemoryStore {
    fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    fn add_member(&self, band: usize, hash: u64, id: VectorId) -> Result<()> {
        let key = self.keyspace.band_key(band, hash);
        let mut entry = self
            .backend
            .map
            .entry(key.clone())
            .or_insert_with(|| Value::Set(HashSet::new()));
        match entry.value_mut() {
            Value::Set(members) => {
                members.insert(id);
                Ok(())
            }
            Value::Bytes(_) => Err(wrong_type(&key)),
        }
    }

    fn remove_member(&self, band: usize, hash: u64, id: VectorId) -> Result<()> {
        let key = self.keyspace.band_key(band, hash);
        {
            let Some(mut entry) = self.backend.map.get_mut(&key) else {
                return Ok(());
            };
            match entry.value_mut() {
                Value::Set(members) => {
                    members.remove(&id);
                }
                Value::Bytes(_) => return Err(wrong_type(&key)),
            }
        }
        self.backend
            .map
            .remove_if(&key, |_, v| matches!(v, Value::Set(s) if s.is_empty()));
        Ok(())
    }

    fn scan_members(
        &self,
        band: usize,
        hash: u64,
        batch: usize,
        visit: &mut dyn FnMut(&[VectorId]) -> ControlFlow<()>,
    ) -> Result<()> {
        let key = self.keyspace.band_key(band, hash);
        let Some(entry) = self.backend.map.get(&key) else {
            return Ok(());
        };
        let Value::Set(members) = entry.value() else {
            return Err(wrong_type(&key));
        };

        let batch = batch.max(1);
        let mut chunk = Vec::with_capacity(batch.min(members.len()));
        for &id in members {
            chunk.push(id);
            if chunk.len() == batch {
                if visit(&chunk).is_break() {
                    return Ok(());
                }
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            let _ = visit(&chunk);
        }
        Ok(())
    }

    fn put_vector(&self, id: VectorId, payload: &[u8]) -> Result<()> {
        self.put_bytes(self.keyspace.vector_key(id), payload);
        Ok(())
    }

    fn get_vector(&self, id: VectorId) -> Result<Option<Vec<u8>>> {
        self.get_bytes(&self.keyspace.vector_key(id))
    }

    fn delete_vector(&self, id: VectorId) -> Result<bool> {
        Ok(self
            .backend
            .map
            .remove(&self.keyspace.vector_key(id))
            .is_some())
    }

    fn put_meta(&self, blob: &[u8]) -> Result<()> {
        self.put_bytes(self.keyspace.meta_key(), blob);
        Ok(())
    }

    fn put_meta_if_absent(&self, blob: &[u8]) -> Result<bool> {
        match self.backend.map.entry(self.keyspace.meta_key()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Value::Bytes(blob.to_vec()));
                Ok(true)
            }
        }
    }

    fn get_meta(&self) -> Result<Option<Vec<u8>>> {
        self.get_bytes(&self.keyspace.meta_key())
    }

    fn clear_namespace(&self) -> Result<u64> {
        let keys = self
            .backend
            .keys_with_prefix(&self.keyspace.namespace_prefix());
        let mut deleted = 0;
        for key in keys {
            if self.backend.map.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn counts(&self) -> Result<NamespaceCounts> {
        let vec_prefix = self.keyspace.vector_prefix();
        let band_prefix = self.keyspace.band_prefix();
        let mut counts = NamespaceCounts::default();
        for entry in self.backend.map.iter() {
            let key = entry.key();
            if key.starts_with(&vec_prefix) {
                counts.vectors += 1;
            } else if key.starts_with(&band_prefix) {
                counts.buckets += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_idempotent() {
        let store = MemoryStore::new("t");
        store.add_member(0, 5, 1).unwrap();
        store.add_member(0, 5, 1).unwrap();
        store.add_member(0, 5, 2).unwrap();
        assert_eq!(store.get_members(0, 5).unwrap(), HashSet::from([1, 2]));

        store.remove_member(0, 5, 1).unwrap();
        store.remove_member(0, 5, 1).unwrap();
        store.remove_member(3, 3, 9).unwrap();
        assert_eq!(store.get_members(0, 5).unwrap(), HashSet::from([2]));
    }

    #[test]
    fn empty_bucket_key_is_dropped() {
        let store = MemoryStore::new("t");
        store.add_member(1, 7, 10).unwrap();
        assert_eq!(store.counts().unwrap().buckets, 1);
        store.remove_member(1, 7, 10).unwrap();
        assert_eq!(store.counts().unwrap().buckets, 0);
        assert_eq!(store.backend().key_count(), 0);
    }

    #[test]
    fn scan_streams_in_batches_and_stops_early() {
        let store = MemoryStore::new("t");
        for id in 0..10 {
            store.add_member(0, 0, id).unwrap();
        }

        let mut chunks = Vec::new();
        store
            .scan_members(0, 0, 3, &mut |c| {
                chunks.push(c.len());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(chunks, vec![3, 3, 3, 1]);

        let mut seen = 0;
        store
            .scan_members(0, 0, 4, &mut |c| {
                seen += c.len();
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(seen, 4);
    }

    #[test]
    fn namespaces_share_backend_but_not_keys() {
        let backend = MemoryBackend::new();
        let a = MemoryStore::with_backend(backend.clone(), "a");
        let ab = MemoryStore::with_backend(backend.clone(), "ab");

        a.put_vector(1, b"xx").unwrap();
        a.add_member(0, 1, 1).unwrap();
        ab.put_vector(1, b"yy").unwrap();

        assert_eq!(a.clear_namespace().unwrap(), 2);
        assert_eq!(ab.get_vector(1).unwrap().as_deref(), Some(&b"yy"[..]));
        assert_eq!(backend.key_count(), 1);
    }

    #[test]
    fn wrong_type_is_inconsistent() {
        let store = MemoryStore::new("t");
        store
            .backend()
            .map
            .insert(store.keyspace().band_key(0, 0), Value::Bytes(vec![1]));
        assert!(matches!(
            store.add_member(0, 0, 1),
            Err(LshError::StorageInconsistent(_))
        ));
    }
}
