//! Consistent read-only views.

use hashfs_index::{FileRecord, IndexReader, VfsPath};

use crate::engine::resolve;
use crate::error::{FsError, FsResult};

/// A point-in-time view of the tree backed by one read transaction.
///
/// Every query on a snapshot sees the same committed state, so two stats
/// taken through one snapshot can never straddle a concurrent rename.
/// Keep snapshots short-lived: LMDB cannot reclaim pages a reader still
/// sees.
pub struct Snapshot<'fs> {
    reader: IndexReader<'fs>,
}

impl<'fs> Snapshot<'fs> {
    pub(crate) fn new(reader: IndexReader<'fs>) -> Self {
        Self { reader }
    }

    pub fn stat(&self, path: &str) -> FsResult<FileRecord> {
        stat_in(&self.reader, &resolve(path)?)
    }

    pub fn exists(&self, path: &str) -> FsResult<bool> {
        Ok(self.reader.get(&resolve(path)?)?.is_some())
    }

    pub fn read_dir(&self, path: &str) -> FsResult<Vec<FileRecord>> {
        read_dir_in(&self.reader, &resolve(path)?)
    }
}

pub(crate) fn stat_in(reader: &IndexReader<'_>, path: &VfsPath) -> FsResult<FileRecord> {
    reader
        .get(path)?
        .ok_or_else(|| FsError::NotFound(path.to_string()))
}

pub(crate) fn read_dir_in(reader: &IndexReader<'_>, dir: &VfsPath) -> FsResult<Vec<FileRecord>> {
    let record = stat_in(reader, dir)?;
    if !record.is_dir() {
        return Err(FsError::NotADirectory(dir.to_string()));
    }
    Ok(reader
        .children(dir)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}
