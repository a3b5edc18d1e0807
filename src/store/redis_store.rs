//! Redis-backed bucket store.
//!
//! Buckets are Redis sets, payloads and meta are strings. Batched membership
//! writes go out as one pipeline per vector, and candidate payloads are read
//! with `MGET`. Hot buckets are streamed with `SSCAN`, so a bucket holding
//! millions of ids is never pulled in one reply.
//!
//! Connections come from a fixed-size pool. A slot is checked out for the
//! duration of one command or pipeline; waiting longer than the configured
//! timeout for a slot is reported as `StorageUnavailable`, the same as a
//! command timeout.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use redis::{Client, Connection, RedisError};
use tracing::{debug, warn};

use super::{BucketStore, Keyspace, NamespaceCounts};
use crate::config::StoreConfig;
use crate::error::{LshError, Result};
use crate::VectorId;

/// Keys per `SCAN` round trip when walking a namespace.
const SCAN_COUNT: usize = 1000;

impl From<RedisError> for LshError {
    fn from(e: RedisError) -> Self {
        if e.is_timeout() || e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped()
        {
            LshError::unavailable(e.to_string())
        } else {
            LshError::inconsistent(format!("redis: {e}"))
        }
    }
}

/// Bounded pool. Each slot is either an open connection or `None`, meaning
/// the slot may open a new one.
struct Pool {
    client: Client,
    timeout: Duration,
    slots_tx: Sender<Option<Connection>>,
    slots_rx: Receiver<Option<Connection>>,
}

impl Pool {
    fn new(client: Client, size: usize, timeout: Duration) -> Self {
        let (slots_tx, slots_rx) = bounded(size);
        for _ in 0..size {
            // Cannot fail: the channel has exactly `size` free slots.
            let _ = slots_tx.send(None);
        }
        Self {
            client,
            timeout,
            slots_tx,
            slots_rx,
        }
    }

    fn get(&self) -> Result<PooledConnection<'_>> {
        let slot = self.slots_rx.recv_timeout(self.timeout).map_err(|_| {
            LshError::unavailable(format!(
                "no redis connection available within {:?}",
                self.timeout
            ))
        })?;

        let conn = match slot {
            Some(conn) => conn,
            None => match self.connect() {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = self.slots_tx.send(None);
                    return Err(e);
                }
            },
        };
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        debug!("opened redis connection");
        Ok(conn)
    }
}

/// A checked-out connection. Returns to the pool on drop.
struct PooledConnection<'a> {
    pool: &'a Pool,
    conn: Option<Connection>,
}

impl PooledConnection<'_> {
    /// Run `f` on the connection. Connections that hit an unrecoverable
    /// error are closed instead of being returned to the pool.
    fn run<T>(&mut self, f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>) -> Result<T> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(LshError::unavailable("redis connection already discarded"));
        };
        match f(conn) {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_unrecoverable_error() || e.is_timeout() {
                    warn!(error = %e, "discarding redis connection");
                    self.conn = None;
                }
                Err(e.into())
            }
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        let _ = self.pool.slots_tx.send(self.conn.take());
    }
}

/// [`BucketStore`] backed by Redis.
pub struct RedisStore {
    keyspace: Keyspace,
    pool: Pool,
}

impl RedisStore {
    /// Connect to `config.uri`, bound to namespace `prefix`.
    ///
    /// Opens one connection eagerly so an unreachable server fails here
    /// rather than on the first write.
    pub fn connect(config: &StoreConfig, prefix: impl Into<String>) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(LshError::invalid("store.pool_size must be > 0"));
        }
        let client = Client::open(config.uri.as_str())
            .map_err(|e| LshError::invalid(format!("store uri {:?}: {e}", config.uri)))?;
        let store = Self {
            keyspace: Keyspace::new(prefix),
            pool: Pool::new(client, config.pool_size, config.timeout),
        };
        store
            .pool
            .get()?
            .run(|c| redis::cmd("PING").query::<String>(c))?;
        Ok(store)
    }

    /// Walk every key matching `pattern`, handing batches to `f`.
    fn scan_keys(
        &self,
        pattern: &str,
        mut f: impl FnMut(&mut PooledConnection<'_>, Vec<String>) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.pool.get()?;
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = conn.run(|c| {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(c)
            })?;
            if !keys.is_empty() {
                f(&mut conn, keys)?;
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}

impl BucketStore for RedisStore {
    fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    fn add_member(&self, band: usize, hash: u64, id: VectorId) -> Result<()> {
        let key = self.keyspace.band_key(band, hash);
        self.pool
            .get()?
            .run(|c| redis::cmd("SADD").arg(&key).arg(id).query::<()>(c))
    }

    fn remove_member(&self, band: usize, hash: u64, id: VectorId) -> Result<()> {
        let key = self.keyspace.band_key(band, hash);
        // Redis deletes a set when its last member is removed.
        self.pool
            .get()?
            .run(|c| redis::cmd("SREM").arg(&key).arg(id).query::<()>(c))
    }

    fn scan_members(
        &self,
        band: usize,
        hash: u64,
        batch: usize,
        visit: &mut dyn FnMut(&[VectorId]) -> ControlFlow<()>,
    ) -> Result<()> {
        let key = self.keyspace.band_key(band, hash);
        let mut conn = self.pool.get()?;
        let mut cursor: u64 = 0;
        loop {
            let (next, ids): (u64, Vec<VectorId>) = conn.run(|c| {
                redis::cmd("SSCAN")
                    .arg(&key)
                    .arg(cursor)
                    .arg("COUNT")
                    .arg(batch.max(1))
                    .query(c)
            })?;
            if !ids.is_empty() && visit(&ids).is_break() {
                return Ok(());
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }

    fn add_members(&self, id: VectorId, buckets: &[(usize, u64)]) -> Result<()> {
        if buckets.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for &(band, hash) in buckets {
            pipe.cmd("SADD")
                .arg(self.keyspace.band_key(band, hash))
                .arg(id)
                .ignore();
        }
        self.pool.get()?.run(|c| pipe.query::<()>(c))
    }

    fn remove_members(&self, id: VectorId, buckets: &[(usize, u64)]) -> Result<()> {
        if buckets.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for &(band, hash) in buckets {
            pipe.cmd("SREM")
                .arg(self.keyspace.band_key(band, hash))
                .arg(id)
                .ignore();
        }
        self.pool.get()?.run(|c| pipe.query::<()>(c))
    }

    fn put_vector(&self, id: VectorId, payload: &[u8]) -> Result<()> {
        let key = self.keyspace.vector_key(id);
        self.pool
            .get()?
            .run(|c| redis::cmd("SET").arg(&key).arg(payload).query::<()>(c))
    }

    fn get_vector(&self, id: VectorId) -> Result<Option<Vec<u8>>> {
        let key = self.keyspace.vector_key(id);
        self.pool
            .get()?
            .run(|c| redis::cmd("GET").arg(&key).query(c))
    }

    fn get_vectors(&self, ids: &[VectorId]) -> Result<Vec<Option<Vec<u8>>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        for &id in ids {
            cmd.arg(self.keyspace.vector_key(id));
        }
        self.pool.get()?.run(|c| cmd.query(c))
    }

    fn delete_vector(&self, id: VectorId) -> Result<bool> {
        let key = self.keyspace.vector_key(id);
        let removed: u64 = self
            .pool
            .get()?
            .run(|c| redis::cmd("DEL").arg(&key).query(c))?;
        Ok(removed > 0)
    }

    fn put_meta(&self, blob: &[u8]) -> Result<()> {
        let key = self.keyspace.meta_key();
        self.pool
            .get()?
            .run(|c| redis::cmd("SET").arg(&key).arg(blob).query::<()>(c))
    }

    fn put_meta_if_absent(&self, blob: &[u8]) -> Result<bool> {
        let key = self.keyspace.meta_key();
        let reply: Option<String> = self.pool.get()?.run(|c| {
            redis::cmd("SET")
                .arg(&key)
                .arg(blob)
                .arg("NX")
                .query(c)
        })?;
        Ok(reply.is_some())
    }

    fn get_meta(&self) -> Result<Option<Vec<u8>>> {
        let key = self.keyspace.meta_key();
        self.pool
            .get()?
            .run(|c| redis::cmd("GET").arg(&key).query(c))
    }

    fn clear_namespace(&self) -> Result<u64> {
        let pattern = self.keyspace.namespace_pattern();
        let mut deleted = 0u64;
        self.scan_keys(&pattern, |conn, keys| {
            let n: u64 = conn.run(|c| redis::cmd("UNLINK").arg(&keys).query(c))?;
            deleted += n;
            Ok(())
        })?;
        debug!(namespace = %self.keyspace.prefix(), deleted, "cleared redis namespace");
        Ok(deleted)
    }

    fn counts(&self) -> Result<NamespaceCounts> {
        // SCAN may return a key more than once; count distinct keys.
        let mut vectors = HashSet::new();
        self.scan_keys(&self.keyspace.vector_pattern(), |_, keys| {
            vectors.extend(keys);
            Ok(())
        })?;
        let mut buckets = HashSet::new();
        self.scan_keys(&self.keyspace.band_pattern(), |_, keys| {
            buckets.extend(keys);
            Ok(())
        })?;
        Ok(NamespaceCounts {
            vectors: vectors.len() as u64,
            buckets: buckets.len() as u64,
        })
    }
}
