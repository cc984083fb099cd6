//! The engine façade.
//!
//! Composes the log store, the sharded cache and the worker pool, and
//! applies the write-through policy: a value is cached only after the log
//! has accepted it, so a cache hit always reflects a successful write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{CacheStats, ShardedCache};
use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::executor::WorkerPool;
use crate::log::LogStore;

/// Single-node key-value engine over an append-only log, with a
/// write-through LRU cache and an async surface backed by a worker pool.
///
/// Dropping the engine stops new submissions, drains in-flight tasks,
/// then tears down the components; the log store writes its index
/// snapshot on the way out.
pub struct KvEngine {
    inner: Arc<EngineInner>,
    pool: WorkerPool,
    stopped: AtomicBool,
}

struct EngineInner {
    log: LogStore,
    cache: ShardedCache,
}

impl EngineInner {
    fn put(&self, key: i32, value: &[u8]) -> bool {
        if !self.log.put(key, value) {
            return false;
        }
        self.cache.put(key, value.to_vec());
        true
    }

    fn get(&self, key: i32) -> Option<Vec<u8>> {
        if let Some(value) = self.cache.get(key) {
            return Some(value);
        }
        let value = self.log.get(key)?;
        self.cache.put(key, value.clone());
        Some(value)
    }

    fn del(&self, key: i32) -> bool {
        // Invalidate first so the cache never serves a tombstoned key.
        self.cache.remove(key);
        self.log.del(key)
    }
}

impl KvEngine {
    /// Open (or create) an engine per the given configuration.
    pub fn open(config: EngineConfig) -> Result<Self, StoreError> {
        let log = LogStore::open(
            &config.storage_file,
            config.clean_start,
            config.gc_interval,
        )?;
        let cache = ShardedCache::new(config.cache_capacity, config.cache_num_segments);
        let pool = WorkerPool::new(config.thread_pool_size);

        Ok(Self {
            inner: Arc::new(EngineInner { log, cache }),
            pool,
            stopped: AtomicBool::new(false),
        })
    }

    /// Store a value. On success the value is also written through to the
    /// cache. Overwriting an existing key succeeds and supersedes it.
    pub fn put(&self, key: i32, value: &[u8]) -> bool {
        self.inner.put(key, value)
    }

    /// Fetch a value: from the cache on a hit, from the log otherwise
    /// (populating the cache). `None` means absent or deleted.
    pub fn get(&self, key: i32) -> Option<Vec<u8>> {
        self.inner.get(key)
    }

    /// Delete a key. Returns `false` if it was absent or already deleted.
    pub fn del(&self, key: i32) -> bool {
        self.inner.del(key)
    }

    /// Asynchronous [`put`](Self::put); the callback receives the result.
    /// After [`stop`](Self::stop) the callback fires immediately with
    /// `false`.
    pub fn async_put(
        &self,
        key: i32,
        value: Vec<u8>,
        callback: impl FnOnce(bool) + Send + 'static,
    ) {
        if self.stopped.load(Ordering::Acquire) {
            callback(false);
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.pool.submit(move || {
            callback(inner.put(key, &value));
        });
    }

    /// Asynchronous [`get`](Self::get); the callback receives the value.
    /// After [`stop`](Self::stop) the callback fires immediately with
    /// `None`.
    pub fn async_get(&self, key: i32, callback: impl FnOnce(Option<Vec<u8>>) + Send + 'static) {
        if self.stopped.load(Ordering::Acquire) {
            callback(None);
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.pool.submit(move || {
            callback(inner.get(key));
        });
    }

    /// Asynchronous [`del`](Self::del); the callback receives the result.
    /// After [`stop`](Self::stop) the callback fires immediately with
    /// `false`.
    pub fn async_del(&self, key: i32, callback: impl FnOnce(bool) + Send + 'static) {
        if self.stopped.load(Ordering::Acquire) {
            callback(false);
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.pool.submit(move || {
            callback(inner.del(key));
        });
    }

    /// Run one compaction pass now, independent of the background timer.
    pub fn garbage_collect(&self) {
        self.inner.log.compact();
    }

    /// Number of reads the log store served from the data file; cache
    /// hits do not count.
    pub fn file_store_read_count(&self) -> u64 {
        self.inner.log.read_count()
    }

    /// Cache telemetry counters.
    pub fn cache_stats(&self) -> &CacheStats {
        self.inner.cache.stats()
    }

    /// Stop accepting async submissions. In-flight tasks keep running;
    /// subsequent async calls short-circuit to their callbacks.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Block until every submitted task has completed.
    pub fn wait_all(&self) {
        self.pool.wait_all();
    }
}

impl Drop for KvEngine {
    fn drop(&mut self) {
        self.stop();
        self.pool.wait_all();
    }
}
