//! Error types surfaced when opening a store.
//!
//! Only construction and snapshot loading report structured errors. The
//! operational surface stays coarse: mutators return `bool`, reads return
//! `Option`, and I/O failures inside them are logged and absorbed.

use std::path::PathBuf;

/// Errors returned while opening a store or loading its index snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error on the data file or index snapshot.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The index snapshot is truncated or otherwise malformed.
    #[error("corrupt index snapshot {path}: {reason}")]
    CorruptSnapshot {
        /// Path of the offending snapshot file.
        path: PathBuf,
        /// What made the snapshot unreadable.
        reason: &'static str,
    },
}
