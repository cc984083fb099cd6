//! Engine configuration.
//!
//! All behavior is driven by constructor arguments; there are no environment
//! variables and no config files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_SEGMENTS, DEFAULT_GC_INTERVAL, DEFAULT_POOL_SIZE,
};

/// Configuration for [`KvEngine`](crate::KvEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path of the data file. The index snapshot lives at `<path>.idx`.
    pub storage_file: PathBuf,
    /// Number of worker threads serving the async operations.
    pub thread_pool_size: usize,
    /// Total cache capacity in entries, split across the shards.
    pub cache_capacity: usize,
    /// Number of independently locked cache shards.
    pub cache_num_segments: usize,
    /// Delete any existing data and snapshot files before opening.
    pub clean_start: bool,
    /// Interval between background compaction passes.
    pub gc_interval: Duration,
}

impl EngineConfig {
    /// Create a configuration for the given data file path with defaults:
    /// 4 worker threads, 100 cache entries over 8 shards, no clean start,
    /// a 2-hour compaction interval.
    pub fn new(storage_file: impl AsRef<Path>) -> Self {
        Self {
            storage_file: storage_file.as_ref().to_path_buf(),
            thread_pool_size: DEFAULT_POOL_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_num_segments: DEFAULT_CACHE_SEGMENTS,
            clean_start: false,
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }

    /// Set the worker pool size (clamped to at least 1).
    pub fn with_thread_pool_size(mut self, threads: usize) -> Self {
        self.thread_pool_size = threads.max(1);
        self
    }

    /// Set the total cache capacity in entries.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the cache shard count (clamped to at least 1).
    pub fn with_cache_num_segments(mut self, segments: usize) -> Self {
        self.cache_num_segments = segments.max(1);
        self
    }

    /// Delete pre-existing data and snapshot files before opening.
    pub fn with_clean_start(mut self, clean_start: bool) -> Self {
        self.clean_start = clean_start;
        self
    }

    /// Set the background compaction interval.
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }
}
