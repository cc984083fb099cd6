//! Write-through sharded LRU cache
//!
//! The cache is split into independently locked shards; a key is routed to
//! its shard by a stable hash, so there is no global LRU order and no
//! cross-shard coordination. Eviction is per-shard.

mod shard;
mod stats;

pub use stats::CacheStats;

use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_64;

use self::shard::LruShard;

/// Sharded LRU cache keyed by the engine's integer key.
///
/// Constructed with a total capacity `N` and a shard count `S`; each shard
/// holds up to `max(1, N/S)` entries, so the effective global capacity is
/// `S * max(1, N/S)`.
pub struct ShardedCache {
    shards: Vec<Mutex<LruShard>>,
    stats: CacheStats,
}

impl ShardedCache {
    /// Create a cache with `capacity` total entries over `num_segments`
    /// shards (both clamped to at least 1 shard / 1 entry per shard).
    pub fn new(capacity: usize, num_segments: usize) -> Self {
        let num_segments = num_segments.max(1);
        let segment_capacity = (capacity / num_segments).max(1);
        let shards = (0..num_segments)
            .map(|_| Mutex::new(LruShard::new(segment_capacity)))
            .collect();
        Self {
            shards,
            stats: CacheStats::new(),
        }
    }

    /// Look up a key, refreshing its recency on a hit.
    pub fn get(&self, key: i32) -> Option<Vec<u8>> {
        let value = self.shard_for(key).lock().get(key);
        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    /// Insert or overwrite a key, evicting the shard's LRU entry if full.
    pub fn put(&self, key: i32, value: Vec<u8>) {
        let evicted = self.shard_for(key).lock().put(key, value);
        self.stats.record_insertion();
        if evicted {
            self.stats.record_eviction();
        }
    }

    /// Drop a key if present; a no-op otherwise.
    pub fn remove(&self, key: i32) {
        self.shard_for(key).lock().remove(key);
    }

    /// Total number of cached entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().len() == 0)
    }

    /// Number of shards.
    pub fn num_segments(&self) -> usize {
        self.shards.len()
    }

    /// Per-shard entry capacity.
    pub fn segment_capacity(&self) -> usize {
        self.shards[0].lock().capacity()
    }

    /// Cache telemetry counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    // The hash must be deterministic across runs; do not use DefaultHasher.
    fn shard_for(&self, key: i32) -> &Mutex<LruShard> {
        let hash = xxh3_64(&key.to_le_bytes());
        &self.shards[(hash % self.shards.len() as u64) as usize]
    }
}
