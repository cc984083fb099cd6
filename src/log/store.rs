//! The append-only value log and its in-memory index.
//!
//! ## Locking
//!
//! Two locks with a strict hierarchy: the index `RwLock` is always taken
//! first, the file mutex second, and no lock is ever acquired while the
//! file mutex is held. Mutators (`put`, `del`, compaction) take the index
//! lock exclusively; `get` takes it shared and holds it across the file
//! read.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::compactor::{GcTarget, GcWorker};
use super::meta::{self, RecordMeta};
use crate::constants::{INDEX_FILE_SUFFIX, TMP_FILE_SUFFIX};
use crate::error::StoreError;

/// Append-only log store: a flat data file, a fully-resident key index,
/// and a background compaction thread.
///
/// Dropping the store stops the compactor, writes the index snapshot and
/// closes the data file; a cleanly dropped store reopens in place.
pub struct LogStore {
    inner: Arc<StoreInner>,
    gc: GcWorker<StoreInner>,
}

impl LogStore {
    /// Open the store at `path`, creating the data file if absent and
    /// loading the index snapshot if one exists. With `clean_start`, any
    /// existing data and snapshot files are deleted first.
    pub fn open(
        path: impl AsRef<Path>,
        clean_start: bool,
        gc_interval: Duration,
    ) -> Result<Self, StoreError> {
        let inner = Arc::new(StoreInner::open(path.as_ref(), clean_start)?);
        let gc = GcWorker::start(Arc::downgrade(&inner), gc_interval);
        Ok(Self { inner, gc })
    }

    /// Append a value and point the key's index entry at it. Returns
    /// `false` if the write failed, in which case the index is untouched.
    pub fn put(&self, key: i32, value: &[u8]) -> bool {
        self.inner.put(key, value)
    }

    /// Read the current value for a key, or `None` if the key is absent
    /// or tombstoned.
    pub fn get(&self, key: i32) -> Option<Vec<u8>> {
        self.inner.get(key)
    }

    /// Tombstone a key. Returns `false` if it was absent or already
    /// tombstoned. The payload bytes remain until compaction.
    pub fn del(&self, key: i32) -> bool {
        self.inner.del(key)
    }

    /// Rewrite the data file to contain only live payloads and drop
    /// tombstones from the index.
    pub fn compact(&self) {
        self.inner.compact();
    }

    /// Number of reads served from the data file.
    pub fn read_count(&self) -> u64 {
        self.inner.read_count()
    }

    /// Current length of the data file in bytes (dead bytes included).
    pub fn file_size(&self) -> u64 {
        self.inner.file_size()
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.gc.stop();
        self.inner.save_snapshot();
    }
}

struct DataFile {
    file: File,
    /// Current file length; the offset of the next append.
    size: u64,
}

impl DataFile {
    fn append(&mut self, value: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.size))?;
        self.file.write_all(value)?;
        self.file.flush()?;
        self.size += value.len() as u64;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

pub(crate) struct StoreInner {
    path: PathBuf,
    index: RwLock<HashMap<i32, RecordMeta>>,
    file: Mutex<DataFile>,
    read_count: AtomicU64,
}

impl StoreInner {
    fn open(path: &Path, clean_start: bool) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let snapshot_path = snapshot_path(&path);

        if clean_start {
            remove_if_exists(&path)?;
            remove_if_exists(&snapshot_path)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let (index, size) = if snapshot_path.exists() {
            let index = meta::read_snapshot(&snapshot_path)?;
            // Tombstoned entries still occupy bytes, so the file extent is
            // the maximum end offset over every entry.
            let size = index.values().map(RecordMeta::end).max().unwrap_or(0);
            info!(path = %path.display(), entries = index.len(), "loaded index snapshot");
            (index, size)
        } else {
            info!(path = %path.display(), "no index snapshot found, starting fresh");
            (HashMap::new(), 0)
        };

        Ok(Self {
            path,
            index: RwLock::new(index),
            file: Mutex::new(DataFile { file, size }),
            read_count: AtomicU64::new(0),
        })
    }

    pub(crate) fn put(&self, key: i32, value: &[u8]) -> bool {
        let mut index = self.index.write();

        let offset = {
            let mut data = self.file.lock();
            let offset = data.size;
            if let Err(e) = data.append(value) {
                warn!(key, error = %e, "value append failed");
                return false;
            }
            offset
        };

        index.insert(
            key,
            RecordMeta {
                key,
                offset,
                size: value.len() as u64,
                deleted: false,
            },
        );
        true
    }

    pub(crate) fn get(&self, key: i32) -> Option<Vec<u8>> {
        let index = self.index.read();
        let meta = match index.get(&key) {
            Some(meta) if !meta.deleted => *meta,
            _ => return None,
        };

        // The shared index lock stays held across the file read so a
        // concurrent compaction cannot invalidate the offset.
        let mut data = self.file.lock();
        match data.read_at(meta.offset, meta.size as usize) {
            Ok(value) => {
                self.read_count.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "value read failed");
                None
            }
        }
    }

    pub(crate) fn del(&self, key: i32) -> bool {
        let mut index = self.index.write();
        match index.get_mut(&key) {
            Some(meta) if !meta.deleted => {
                meta.deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Rewrite the live set into `<path>.tmp`, rename it over the data
    /// file, and swap in the rebuilt index.
    ///
    /// The index and file handle are only replaced after every I/O step
    /// has succeeded; any failure leaves the previous index and the old
    /// (pre-rename) handle fully consistent.
    pub(crate) fn compact(&self) {
        let mut index = self.index.write();
        let live: Vec<RecordMeta> = index.values().filter(|m| !m.deleted).copied().collect();
        let tombstones = index.len() - live.len();

        let mut data = self.file.lock();
        match rewrite_live(&self.path, &mut data.file, &live) {
            Ok((new_index, new_file, new_size)) => {
                let reclaimed = data.size.saturating_sub(new_size);
                data.file = new_file;
                data.size = new_size;
                drop(data);
                *index = new_index;
                debug!(
                    records = live.len(),
                    tombstones, reclaimed, "compaction finished"
                );
            }
            Err(e) => {
                let _ = fs::remove_file(tmp_path(&self.path));
                warn!(error = %e, "compaction failed, keeping previous state");
            }
        }
    }

    pub(crate) fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    pub(crate) fn file_size(&self) -> u64 {
        // Lock hierarchy: index before file, even for a plain read.
        let _index = self.index.read();
        self.file.lock().size
    }

    /// Persist the index (tombstones included) next to the data file.
    fn save_snapshot(&self) {
        let index = self.index.read();
        let snapshot_path = snapshot_path(&self.path);
        match meta::write_snapshot(&snapshot_path, &index) {
            Ok(()) => info!(entries = index.len(), "index snapshot written"),
            Err(e) => warn!(path = %snapshot_path.display(), error = %e, "index snapshot write failed"),
        }
    }
}

impl GcTarget for StoreInner {
    fn run_gc(&self) {
        self.compact();
    }
}

/// Copy every live payload from the current file into a fresh temp file,
/// rename it over the data path, and reopen it read+write.
fn rewrite_live(
    path: &Path,
    old: &mut File,
    live: &[RecordMeta],
) -> io::Result<(HashMap<i32, RecordMeta>, File, u64)> {
    let tmp = tmp_path(path);
    let mut out = File::create(&tmp)?;

    let mut new_index = HashMap::with_capacity(live.len());
    let mut new_offset = 0u64;
    for meta in live {
        old.seek(SeekFrom::Start(meta.offset))?;
        let mut buf = vec![0u8; meta.size as usize];
        old.read_exact(&mut buf)?;
        out.write_all(&buf)?;

        new_index.insert(
            meta.key,
            RecordMeta {
                key: meta.key,
                offset: new_offset,
                size: meta.size,
                deleted: false,
            },
        );
        new_offset += meta.size;
    }

    out.sync_all()?;
    drop(out);
    fs::rename(&tmp, path)?;

    let file = OpenOptions::new().read(true).write(true).open(path)?;
    Ok((new_index, file, new_offset))
}

fn snapshot_path(path: &Path) -> PathBuf {
    suffixed(path, INDEX_FILE_SUFFIX)
}

fn tmp_path(path: &Path) -> PathBuf {
    suffixed(path, TMP_FILE_SUFFIX)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
