//! Bounded, thread-safe cache of anatomical frames.
//!
//! Keys combine the frame kind with a spatially bucketed snapshot of the
//! anchor positions: every coordinate is quantized to `bucket_width`, so
//! anchor jitter smaller than a bucket reuses the cached frame instead of
//! rebuilding it. The cache bounds the positional error it introduces at
//! `bucket_width / 2` per axis.
//!
//! Entries are evicted two ways: least-recently-used above `capacity`,
//! and by wall-clock TTL regardless of use, so a stale frame never
//! outlives the interval it was computed for. This cache is the engine's
//! only shared mutable state; the builder runs under the cache lock, so
//! at most one computation per key is ever in flight.

use std::collections::HashMap;
use std::mem::size_of;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::geometry::{build_frame, AnatomicalFrame, AnchorPoints, FrameKind};

/// Rough per-entry bookkeeping overhead of the backing hash map.
const MAP_ENTRY_OVERHEAD: usize = 16;

/// Cache tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident frames before LRU eviction.
    pub capacity: usize,
    /// Wall-clock lifetime of an entry, counted from computation.
    pub ttl: Duration,
    /// Edge length of a spatial bucket, in capture-space units. Inputs
    /// whose anchors all fall in the same buckets share an entry.
    pub bucket_width: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl: Duration::from_millis(200),
            bucket_width: 0.01,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.capacity == 0 {
            return Err(EngineError::config("cache capacity must be at least 1"));
        }
        if !(self.bucket_width.is_finite() && self.bucket_width > 0.0) {
            return Err(EngineError::config("cache bucket width must be positive"));
        }
        if self.ttl.is_zero() {
            return Err(EngineError::config("cache ttl must be non-zero"));
        }
        Ok(())
    }
}

/// Counters and size of the cache at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    /// Estimated resident memory of keys and entries, in bytes.
    pub memory_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: FrameKind,
    cells: [i64; 9],
}

impl CacheKey {
    fn quantize(kind: FrameKind, anchors: &AnchorPoints, bucket_width: f64) -> Self {
        let mut cells = [0i64; 9];
        for (slot, point) in [anchors.a, anchors.b, anchors.c].into_iter().enumerate() {
            for axis in 0..3 {
                cells[slot * 3 + axis] = (point[axis] / bucket_width).round() as i64;
            }
        }
        Self { kind, cells }
    }
}

struct Entry {
    frame: AnatomicalFrame,
    computed_at: Instant,
    last_used: u64,
}

struct Inner {
    entries: HashMap<CacheKey, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl Inner {
    fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }
}

/// Bounded cache in front of [`build_frame`].
pub struct FrameCache {
    inner: Mutex<Inner>,
    config: CacheConfig,
}

impl FrameCache {
    pub fn new(config: CacheConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(Inner::empty()),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached frame for these anchors, or build, store and
    /// return it with [`build_frame`]. Builder errors propagate unchanged
    /// and nothing is cached for the key.
    pub fn get_or_build(
        &self,
        kind: FrameKind,
        anchors: &AnchorPoints,
    ) -> EngineResult<AnatomicalFrame> {
        self.get_or_compute(kind, anchors, build_frame)
    }

    /// [`Self::get_or_build`] with a caller-supplied builder. The builder
    /// runs under the cache lock, at most once, and only on a miss.
    pub fn get_or_compute<F>(
        &self,
        kind: FrameKind,
        anchors: &AnchorPoints,
        builder: F,
    ) -> EngineResult<AnatomicalFrame>
    where
        F: FnOnce(FrameKind, &AnchorPoints) -> EngineResult<AnatomicalFrame>,
    {
        let key = CacheKey::quantize(kind, anchors, self.config.bucket_width);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.tick += 1;
        let tick = inner.tick;

        if let Some(entry) = inner.entries.get_mut(&key) {
            if entry.computed_at.elapsed() <= self.config.ttl {
                entry.last_used = tick;
                inner.hits += 1;
                debug!("frame cache hit: {}", kind.name());
                return Ok(entry.frame);
            }
            inner.entries.remove(&key);
            inner.expirations += 1;
            debug!("frame cache entry expired: {}", kind.name());
        }

        inner.misses += 1;
        let frame = builder(kind, anchors)?;

        if inner.entries.len() >= self.config.capacity {
            Self::evict_lru(inner);
        }
        inner.entries.insert(
            key,
            Entry {
                frame,
                computed_at: Instant::now(),
                last_used: tick,
            },
        );
        Ok(frame)
    }

    fn evict_lru(inner: &mut Inner) {
        let victim = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);
        if let Some(key) = victim {
            inner.entries.remove(&key);
            inner.evictions += 1;
            debug!("frame cache evicted LRU entry: {}", key.kind.name());
        }
    }

    /// Consistent snapshot of the counters and size.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            size: inner.entries.len(),
            memory_bytes: estimate_cache_memory(inner.entries.len()),
        }
    }

    /// Drop every entry. Counters are kept; use [`Self::reset_stats`] to
    /// zero them.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn reset_stats(&self) {
        let mut inner = self.inner.lock();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.expirations = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        // The default config is valid by construction.
        Self {
            inner: Mutex::new(Inner::empty()),
            config: CacheConfig::default(),
        }
    }
}

fn estimate_cache_memory(entries: usize) -> usize {
    entries * (size_of::<CacheKey>() + size_of::<Entry>() + MAP_ENTRY_OVERHEAD)
}
