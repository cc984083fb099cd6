//! Append-only value log with a resident index and background compaction.
//!
//! The data file is a raw concatenation of value payloads; records are
//! located only through the in-memory index, which is persisted as a
//! snapshot at close and reloaded on open.

mod compactor;
mod meta;
mod store;

pub use meta::RecordMeta;
pub use store::LogStore;
