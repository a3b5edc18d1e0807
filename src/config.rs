//! Index configuration and the persisted meta blob.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{LshError, Result};
use crate::store::GLOB_META;

/// Version of the `{prefix}:meta` blob layout.
pub const META_FORMAT_VERSION: u32 = 1;

/// Connection settings for the external bucket store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store URI, e.g. `redis://host:6379/0`.
    pub uri: String,
    /// Maximum open connections.
    pub pool_size: usize,
    /// Timeout applied to connecting and to every command.
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "redis://127.0.0.1:6379/".to_string(),
            pool_size: 8,
            timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// `redis://{host}:{port}/`.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self {
            uri: format!("redis://{host}:{port}/"),
            ..Self::default()
        }
    }
}

/// Configuration for an [`LshIndex`](crate::LshIndex).
///
/// `dim`, `num_perm`, `rows_per_band`, `seed` and `metric` are bound to the
/// namespace the first time it is opened; reopening with different values
/// fails with [`LshError::StorageInconsistent`].
///
/// ```rust
/// use vicinity_lsh::LshConfig;
///
/// let config = LshConfig::new(128)
///     .with_bands(256, 4)
///     .with_namespace("billion_test")
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.num_bands(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshConfig {
    /// Embedding dimension.
    pub dim: usize,
    /// Signature length in bits.
    pub num_perm: usize,
    /// Signature bits per band. Must divide `num_perm`.
    pub rows_per_band: usize,
    /// Key prefix isolating this index inside a shared store.
    pub namespace: String,
    /// Hyperplane seed. `None` adopts the persisted seed, or generates and
    /// persists a new one for a fresh namespace.
    pub seed: Option<u64>,
    /// Metric for exact re-ranking.
    pub metric: DistanceMetric,
    /// Worker threads for batch ingestion and parallel band lookups.
    pub workers: usize,
    /// Members fetched per store round trip when streaming a bucket.
    pub scan_batch: usize,
    /// Read at most this many members from any one bucket per query.
    /// `None` reads buckets in full.
    pub max_bucket_scan: Option<usize>,
    pub store: StoreConfig,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            dim: 0,
            num_perm: 128,
            rows_per_band: 4,
            namespace: "lsh".to_string(),
            seed: None,
            metric: DistanceMetric::L2,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            scan_batch: 1024,
            max_bucket_scan: None,
            store: StoreConfig::default(),
        }
    }
}

impl LshConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Set signature length and band width together.
    pub fn with_bands(mut self, num_perm: usize, rows_per_band: usize) -> Self {
        self.num_perm = num_perm;
        self.rows_per_band = rows_per_band;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_scan_batch(mut self, scan_batch: usize) -> Self {
        self.scan_batch = scan_batch;
        self
    }

    pub fn with_max_bucket_scan(mut self, cap: usize) -> Self {
        self.max_bucket_scan = Some(cap);
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Number of bands. Only meaningful on a validated config.
    pub fn num_bands(&self) -> usize {
        if self.rows_per_band == 0 {
            0
        } else {
            self.num_perm / self.rows_per_band
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(LshError::invalid("dim must be > 0"));
        }
        if self.num_perm == 0 || self.rows_per_band == 0 {
            return Err(LshError::invalid(
                "num_perm and rows_per_band must both be > 0",
            ));
        }
        if self.num_perm % self.rows_per_band != 0 {
            return Err(LshError::invalid(format!(
                "rows_per_band ({}) must evenly divide num_perm ({})",
                self.rows_per_band, self.num_perm
            )));
        }
        if self.namespace.is_empty()
            || self.namespace.contains(':')
            || self.namespace.contains(GLOB_META)
        {
            return Err(LshError::invalid(format!(
                "namespace {:?} must be non-empty and must not contain ':' or any of *?[]\\",
                self.namespace
            )));
        }
        if self.workers == 0 {
            return Err(LshError::invalid("workers must be > 0"));
        }
        if self.scan_batch == 0 {
            return Err(LshError::invalid("scan_batch must be > 0"));
        }
        if self.max_bucket_scan == Some(0) {
            return Err(LshError::invalid("max_bucket_scan must be > 0 when set"));
        }
        if self.store.pool_size == 0 {
            return Err(LshError::invalid("store.pool_size must be > 0"));
        }
        Ok(())
    }
}

/// Parameters persisted at `{prefix}:meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub dim: usize,
    pub num_perm: usize,
    pub rows_per_band: usize,
    pub seed: u64,
    pub metric: DistanceMetric,
}

impl IndexMeta {
    pub fn from_config(config: &LshConfig, seed: u64) -> Self {
        Self {
            format_version: META_FORMAT_VERSION,
            dim: config.dim,
            num_perm: config.num_perm,
            rows_per_band: config.rows_per_band,
            seed,
            metric: config.metric,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let meta: Self = serde_json::from_slice(bytes)?;
        if meta.format_version != META_FORMAT_VERSION {
            return Err(LshError::inconsistent(format!(
                "meta format version {} is not supported (expected {})",
                meta.format_version, META_FORMAT_VERSION
            )));
        }
        Ok(meta)
    }

    /// Reconcile a persisted meta blob with the supplied config.
    ///
    /// Returns the seed to use. Any parameter disagreement is fatal.
    pub fn reconcile(&self, config: &LshConfig) -> Result<u64> {
        let mut mismatches = Vec::new();
        if self.dim != config.dim {
            mismatches.push(format!("dim {} != {}", self.dim, config.dim));
        }
        if self.num_perm != config.num_perm {
            mismatches.push(format!("num_perm {} != {}", self.num_perm, config.num_perm));
        }
        if self.rows_per_band != config.rows_per_band {
            mismatches.push(format!(
                "rows_per_band {} != {}",
                self.rows_per_band, config.rows_per_band
            ));
        }
        if let Some(seed) = config.seed {
            if seed != self.seed {
                mismatches.push(format!("seed {} != {}", self.seed, seed));
            }
        }
        if self.metric != config.metric {
            mismatches.push(format!(
                "metric {} != {}",
                self.metric.name(),
                config.metric.name()
            ));
        }

        if mismatches.is_empty() {
            Ok(self.seed)
        } else {
            Err(LshError::inconsistent(format!(
                "namespace {:?} was created with different parameters (persisted vs supplied): {}",
                config.namespace,
                mismatches.join(", ")
            )))
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
