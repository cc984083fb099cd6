//! Record metadata and the index snapshot codec.
//!
//! The data file itself is a raw concatenation of value payloads with no
//! framing, so the snapshot is the only way to reconstruct the index on
//! open. The snapshot layout is fixed little-endian: a `u64` entry count
//! followed by that many packed [`RecordMeta::ENCODED_SIZE`]-byte entries.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::error::StoreError;

/// Size of the snapshot's entry-count header.
pub const SNAPSHOT_HEADER_SIZE: usize = 8;

/// Location of one record's payload in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    /// Key owning the record.
    pub key: i32,
    /// Absolute byte offset of the value in the data file.
    pub offset: u64,
    /// Value length in bytes.
    pub size: u64,
    /// Tombstone flag; the payload bytes stay on disk until compaction.
    pub deleted: bool,
}

impl RecordMeta {
    /// Encoded size of one snapshot entry:
    /// key (4) + offset (8) + size (8) + deleted (1), no padding.
    pub const ENCODED_SIZE: usize = 21;

    /// Encode into a fixed little-endian entry.
    pub fn encode(&self) -> [u8; Self::ENCODED_SIZE] {
        let mut buf = [0u8; Self::ENCODED_SIZE];
        buf[..4].copy_from_slice(&self.key.to_le_bytes());
        buf[4..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[12..20].copy_from_slice(&self.size.to_le_bytes());
        buf[20] = self.deleted as u8;
        buf
    }

    /// Decode a fixed little-endian entry.
    pub fn decode(buf: &[u8; Self::ENCODED_SIZE]) -> Self {
        let key = i32::from_le_bytes(buf[..4].try_into().unwrap());
        let offset = u64::from_le_bytes(buf[4..12].try_into().unwrap());
        let size = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        let deleted = buf[20] != 0;
        Self {
            key,
            offset,
            size,
            deleted,
        }
    }

    /// End of the payload in the data file (`offset + size`).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Read a snapshot file back into an index.
pub(crate) fn read_snapshot(path: &Path) -> Result<HashMap<i32, RecordMeta>, StoreError> {
    let mut file = File::open(path)?;
    let mut header = [0u8; SNAPSHOT_HEADER_SIZE];
    file.read_exact(&mut header)
        .map_err(|e| read_error(e, path, "truncated entry-count header"))?;
    let count = u64::from_le_bytes(header);

    // Cap the pre-allocation; a bogus count must fail on read, not alloc.
    let mut index = HashMap::with_capacity(count.min(1 << 16) as usize);
    let mut buf = [0u8; RecordMeta::ENCODED_SIZE];
    for _ in 0..count {
        file.read_exact(&mut buf)
            .map_err(|e| read_error(e, path, "truncated entry"))?;
        let meta = RecordMeta::decode(&buf);
        index.insert(meta.key, meta);
    }
    Ok(index)
}

fn read_error(e: io::Error, path: &Path, reason: &'static str) -> StoreError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StoreError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason,
        }
    } else {
        StoreError::Io(e)
    }
}

/// Write the index to a snapshot file: the entry count, then every entry
/// (tombstones included). Written to a sibling temp file and renamed into
/// place so a torn close never leaves a half-written snapshot behind.
pub(crate) fn write_snapshot(path: &Path, index: &HashMap<i32, RecordMeta>) -> io::Result<()> {
    let tmp_path = path.with_extension("idx.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(&(index.len() as u64).to_le_bytes())?;
        for meta in index.values() {
            writer.write_all(&meta.encode())?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)
}
