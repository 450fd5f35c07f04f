//! Blob garbage collection and usage statistics.

use std::collections::HashSet;

use hashfs_cas::{BlobStore, CasError};
use hashfs_config::log_gc_info;

use crate::engine::HashFs;
use crate::error::FsResult;

/// Outcome of one collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Blobs present in the store
    pub scanned: usize,
    /// Distinct hashes referenced by file records
    pub referenced: usize,
    /// Stored blobs no record references
    pub orphaned: usize,
    /// Orphans actually removed; 0 on a dry run
    pub deleted: usize,
    pub dry_run: bool,
}

/// Aggregate view of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsStats {
    pub file_count: u64,
    /// Directories, not counting the root
    pub dir_count: u64,
    /// Sum of file sizes as seen by readers
    pub logical_bytes: u64,
    /// Distinct content hashes referenced by files
    pub unique_blobs: u64,
}

impl FsStats {
    /// Logical bytes per referenced blob; 1.0 means no sharing.
    pub fn dedup_ratio(&self, stored_bytes: u64) -> f64 {
        if stored_bytes == 0 {
            1.0
        } else {
            self.logical_bytes as f64 / stored_bytes as f64
        }
    }
}

impl<B: BlobStore> HashFs<B> {
    /// Delete blobs no file record references.
    ///
    /// Runs inside a write transaction so no writer can commit a record
    /// pointing at a blob while it is being removed. Writers that stored
    /// content just before the pass re-check the blob when they commit.
    pub fn collect_garbage(&self, dry_run: bool) -> FsResult<GcReport> {
        let report = self.transact("gc", |txn| {
            let referenced = txn.referenced_hashes()?;
            let stored = self.blobs.hashes()?;
            let orphans: Vec<_> = stored
                .iter()
                .filter(|hash| !referenced.contains(*hash))
                .collect();

            let mut deleted = 0;
            if !dry_run {
                for hash in &orphans {
                    match self.blobs.delete(hash) {
                        Ok(()) => deleted += 1,
                        Err(CasError::NotFound { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            Ok(GcReport {
                scanned: stored.len(),
                referenced: referenced.len(),
                orphaned: orphans.len(),
                deleted,
                dry_run,
            })
        })?;

        log_gc_info!(
            "Garbage collection finished",
            scanned = report.scanned,
            orphaned = report.orphaned,
            deleted = report.deleted,
            dry_run = report.dry_run
        );
        Ok(report)
    }

    /// Count files and directories and the content they reference.
    pub fn stats(&self) -> FsResult<FsStats> {
        self.read("stats", |reader| {
            let mut stats = FsStats::default();
            let mut hashes = HashSet::new();
            for (path, record) in reader.iter()? {
                if record.is_dir() {
                    if !path.is_root() {
                        stats.dir_count += 1;
                    }
                    continue;
                }
                stats.file_count += 1;
                stats.logical_bytes += record.size();
                if let Some(hash) = record.hash() {
                    hashes.insert(*hash);
                }
            }
            stats.unique_blobs = hashes.len() as u64;
            Ok(stats)
        })
    }
}
