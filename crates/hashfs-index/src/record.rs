//! Metadata record stored per path.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hashfs_cas::Blake3Hash;
use serde::{Deserialize, Serialize};

/// What a record points at.
///
/// A directory carries no content; a file always carries a hash and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Directory,
    File { hash: Blake3Hash, size: u64 },
}

/// Attributes of one logical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Base name (no separators); `/` for the root
    pub name: String,
    /// Permission bits (e.g., 0o644)
    pub mode: u32,
    /// Modification time (nanoseconds since Unix epoch)
    pub mtime: u64,
    pub uid: u32,
    pub gid: u32,
    pub kind: RecordKind,
}

impl FileRecord {
    pub fn new_directory(name: impl Into<String>, mode: u32, mtime: u64) -> Self {
        Self {
            name: name.into(),
            mode,
            mtime,
            uid: 0,
            gid: 0,
            kind: RecordKind::Directory,
        }
    }

    pub fn new_file(
        name: impl Into<String>,
        hash: Blake3Hash,
        size: u64,
        mode: u32,
        mtime: u64,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            mtime,
            uid: 0,
            gid: 0,
            kind: RecordKind::File { hash, size },
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, RecordKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Content length; 0 for directories.
    pub fn size(&self) -> u64 {
        match self.kind {
            RecordKind::Directory => 0,
            RecordKind::File { size, .. } => size,
        }
    }

    /// Content hash; `None` for directories.
    pub fn hash(&self) -> Option<&Blake3Hash> {
        match &self.kind {
            RecordKind::Directory => None,
            RecordKind::File { hash, .. } => Some(hash),
        }
    }

    pub fn modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.mtime)
    }
}

/// Convert a `SystemTime` into the nanosecond timestamps records carry.
/// Times before the epoch clamp to 0.
pub fn to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Current time as record nanoseconds.
pub fn now_nanos() -> u64 {
    to_nanos(SystemTime::now())
}
