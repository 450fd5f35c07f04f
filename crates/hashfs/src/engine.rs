//! The filesystem engine: directory operations, stat, rename and attribute
//! updates on top of the metadata index.
//!
//! Every mutating operation runs as exactly one index write transaction, so
//! multi-record changes (MkdirAll, RemoveAll, directory Rename) are applied
//! all-or-nothing and concurrent readers only ever see committed trees.

use std::iter;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use hashfs_cas::{BlobStore, CasStore};
use hashfs_config::{log_fs_debug, log_fs_info, log_fs_warn, Config};
use hashfs_index::{
    now_nanos, to_nanos, FileRecord, IndexError, IndexOptions, IndexReader, IndexTxn,
    MetadataIndex, VfsPath,
};

use crate::error::{FsError, FsResult, StorageError};
use crate::snapshot::{read_dir_in, stat_in, Snapshot};

/// Permission bits kept on records; type bits live in the record kind.
pub(crate) const MODE_MASK: u32 = 0o7777;

/// Runtime options for a [`HashFs`] instance.
#[derive(Debug, Clone)]
pub struct HashFsOptions {
    pub index: IndexOptions,
    /// Total attempts for a transaction that keeps hitting conflicts
    pub max_retries: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff`
    pub retry_backoff: Duration,
    /// Mode given to the root and to directories created without one
    pub dir_mode: u32,
    /// Mode given to files created without one
    pub file_mode: u32,
}

impl Default for HashFsOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl HashFsOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            index: IndexOptions {
                map_size: config.index.map_size,
                max_readers: config.index.max_readers,
            },
            max_retries: config.index.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.index.retry_backoff_ms),
            dir_mode: config.defaults.dir_mode,
            file_mode: config.defaults.file_mode,
        }
    }
}

/// Hash-addressed virtual filesystem.
///
/// Holds the metadata index and the blob store it coordinates. Clones share
/// both, so one instance can be handed to many threads; independent
/// instances over different directories never interfere.
pub struct HashFs<B: BlobStore = CasStore> {
    pub(crate) index: MetadataIndex,
    pub(crate) blobs: Arc<B>,
    pub(crate) options: HashFsOptions,
}

impl<B: BlobStore> Clone for HashFs<B> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
            blobs: Arc::clone(&self.blobs),
            options: self.options.clone(),
        }
    }
}

impl HashFs<CasStore> {
    /// Open the index and blob store at the locations named in `config`.
    pub fn open_with_config(config: &Config) -> FsResult<Self> {
        let blobs = CasStore::new(config.storage.resolved_blob_root())?;
        Self::open_at(
            config.storage.resolved_index_dir(),
            blobs,
            HashFsOptions::from_config(config),
        )
    }
}

impl<B: BlobStore> HashFs<B> {
    /// Open (or create) an index at `index_dir` over the given blob store.
    pub fn open_at<P: AsRef<Path>>(index_dir: P, blobs: B, options: HashFsOptions) -> FsResult<Self> {
        let index = MetadataIndex::open(index_dir, &options.index)?;
        Self::with_index(index, Arc::new(blobs), options)
    }

    /// Build an engine over an already opened index, storing the root
    /// directory record if this is a fresh index.
    pub fn with_index(index: MetadataIndex, blobs: Arc<B>, options: HashFsOptions) -> FsResult<Self> {
        let fs = Self {
            index,
            blobs,
            options,
        };
        fs.ensure_root()?;
        Ok(fs)
    }

    fn ensure_root(&self) -> FsResult<()> {
        let root = VfsPath::root();
        let mode = self.options.dir_mode & MODE_MASK;
        self.transact("init", |txn| {
            if txn.get(&root)?.is_none() {
                txn.put(&root, &FileRecord::new_directory("/", mode, now_nanos()))?;
                log_fs_info!("Initialized empty filesystem root");
            }
            Ok(())
        })
    }

    /// Name of this filesystem implementation.
    pub fn name(&self) -> &'static str {
        "HashFS"
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn options(&self) -> &HashFsOptions {
        &self.options
    }

    // ========================================================================
    // Transaction helpers
    // ========================================================================

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` attempts have hit a conflict.
    pub(crate) fn with_retries<T>(
        &self,
        op: &'static str,
        mut attempt: impl FnMut() -> FsResult<T>,
    ) -> FsResult<T> {
        let max = self.options.max_retries.max(1);
        let mut tries = 0u32;
        loop {
            tries += 1;
            match attempt() {
                Err(FsError::Storage(StorageError::Index(source))) if source.is_conflict() => {
                    if tries >= max {
                        return Err(FsError::Storage(StorageError::ConflictRetriesExhausted {
                            op,
                            attempts: tries,
                            source,
                        }));
                    }
                    log_fs_warn!(
                        "Transaction conflict, retrying",
                        op = op,
                        attempt = tries,
                        error = tracing::field::display(&source)
                    );
                    std::thread::sleep(self.options.retry_backoff * tries);
                }
                other => return other,
            }
        }
    }

    /// Run `f` inside one write transaction. Commits if `f` succeeds and
    /// rolls back otherwise.
    pub(crate) fn transact<T>(
        &self,
        op: &'static str,
        mut f: impl FnMut(&mut IndexTxn<'_>) -> FsResult<T>,
    ) -> FsResult<T> {
        self.with_retries(op, || {
            let mut txn = self.index.write_txn()?;
            let value = f(&mut txn)?;
            txn.commit()?;
            Ok(value)
        })
    }

    /// Run `f` against a read snapshot.
    pub(crate) fn read<T>(
        &self,
        op: &'static str,
        mut f: impl FnMut(&IndexReader<'_>) -> FsResult<T>,
    ) -> FsResult<T> {
        self.with_retries(op, || {
            let reader = self.index.read_txn()?;
            f(&reader)
        })
    }

    /// Point-in-time read-only view of the whole tree.
    pub fn snapshot(&self) -> FsResult<Snapshot<'_>> {
        Ok(Snapshot::new(self.index.read_txn()?))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn stat(&self, path: &str) -> FsResult<FileRecord> {
        let target = resolve(path)?;
        self.read("stat", |reader| stat_in(reader, &target))
    }

    pub fn exists(&self, path: &str) -> FsResult<bool> {
        let target = resolve(path)?;
        self.read("exists", |reader| Ok(reader.get(&target)?.is_some()))
    }

    /// Records directly under `path`, ordered by name.
    pub fn read_dir(&self, path: &str) -> FsResult<Vec<FileRecord>> {
        let dir = resolve(path)?;
        self.read("read_dir", |reader| read_dir_in(reader, &dir))
    }

    // ========================================================================
    // Directory creation
    // ========================================================================

    /// Create a single directory. The parent must already be a directory.
    pub fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let target = resolve(path)?;
        if target.is_root() {
            return Err(FsError::AlreadyExists(target.to_string()));
        }

        self.transact("mkdir", |txn| {
            if txn.get(&target)?.is_some() {
                return Err(FsError::AlreadyExists(target.to_string()));
            }
            require_parent_dir(txn, &target)?;
            txn.put(
                &target,
                &FileRecord::new_directory(target.name(), mode & MODE_MASK, now_nanos()),
            )?;
            Ok(())
        })?;

        log_fs_debug!("Created directory", path = target.as_str());
        Ok(())
    }

    /// Create `path` and any missing ancestors. Existing directories along
    /// the way are left untouched.
    pub fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()> {
        let target = resolve(path)?;
        let chain: Vec<VfsPath> = target
            .ancestors()
            .into_iter()
            .chain(iter::once(target.clone()))
            .filter(|dir| !dir.is_root())
            .collect();

        let created = self.transact("mkdir_all", |txn| {
            let mut created = 0usize;
            for dir in &chain {
                match txn.get(dir)? {
                    Some(record) if record.is_dir() => {}
                    Some(_) => return Err(FsError::NotADirectory(dir.to_string())),
                    None => {
                        txn.put(
                            dir,
                            &FileRecord::new_directory(dir.name(), mode & MODE_MASK, now_nanos()),
                        )?;
                        created += 1;
                    }
                }
            }
            Ok(created)
        })?;

        if created > 0 {
            log_fs_debug!("Created directory chain", path = target.as_str(), created = created);
        }
        Ok(())
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove a file or an empty directory.
    pub fn remove(&self, path: &str) -> FsResult<()> {
        let target = resolve(path)?;
        if target.is_root() {
            return Err(FsError::InvalidPath("cannot remove the root directory".to_string()));
        }

        self.transact("remove", |txn| {
            let record = txn
                .get(&target)?
                .ok_or_else(|| FsError::NotFound(target.to_string()))?;
            if record.is_dir() && txn.has_children(&target)? {
                return Err(FsError::DirectoryNotEmpty(target.to_string()));
            }
            txn.delete(&target)?;
            Ok(())
        })?;

        log_fs_debug!("Removed", path = target.as_str());
        Ok(())
    }

    /// Remove `path` and everything below it. A missing path is not an error.
    ///
    /// On the root this empties the filesystem but keeps the root itself.
    pub fn remove_all(&self, path: &str) -> FsResult<()> {
        let target = resolve(path)?;

        let removed = self.transact("remove_all", |txn| {
            let record = match txn.get(&target)? {
                Some(record) => record,
                None => return Ok(0usize),
            };

            let mut removed = 0usize;
            if record.is_dir() {
                for (descendant, _) in txn.descendants(&target)? {
                    txn.delete(&descendant)?;
                    removed += 1;
                }
            }
            if !target.is_root() {
                txn.delete(&target)?;
                removed += 1;
            }
            Ok(removed)
        })?;

        if removed > 0 {
            log_fs_debug!("Removed tree", path = target.as_str(), records = removed);
        }
        Ok(())
    }

    // ========================================================================
    // Rename
    // ========================================================================

    /// Atomically move `old` to `new`, carrying every descendant along when
    /// `old` is a directory.
    ///
    /// An existing file at `new` is replaced when `old` is a file; an existing
    /// empty directory is replaced when `old` is a directory.
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let from = resolve(old)?;
        let to = resolve(new)?;
        if from.is_root() || to.is_root() {
            return Err(FsError::InvalidPath("cannot rename the root directory".to_string()));
        }
        if to.is_descendant_of(&from) {
            return Err(FsError::InvalidPath(format!(
                "cannot move {} into its own subtree {}",
                from, to
            )));
        }

        let moved = self.transact("rename", |txn| {
            let source = txn
                .get(&from)?
                .ok_or_else(|| FsError::NotFound(from.to_string()))?;
            if from == to {
                return Ok(0usize);
            }
            require_parent_dir(txn, &to)?;

            if let Some(target) = txn.get(&to)? {
                match (source.is_dir(), target.is_dir()) {
                    (false, true) => return Err(FsError::IsADirectory(to.to_string())),
                    (true, false) => return Err(FsError::NotADirectory(to.to_string())),
                    (true, true) if txn.has_children(&to)? => {
                        return Err(FsError::DirectoryNotEmpty(to.to_string()))
                    }
                    _ => {}
                }
            }

            let descendants = if source.is_dir() {
                txn.descendants(&from)?
            } else {
                Vec::new()
            };

            txn.delete(&from)?;
            for (path, _) in &descendants {
                txn.delete(path)?;
            }

            let mut relocated = source.clone();
            relocated.name = to.name().to_string();
            txn.put(&to, &relocated)?;
            for (path, record) in &descendants {
                let new_path = path.rebase(&from, &to).ok_or_else(|| {
                    FsError::from(IndexError::Corrupted(format!(
                        "{} listed as a descendant of {}",
                        path, from
                    )))
                })?;
                txn.put(&new_path, record)?;
            }
            Ok(descendants.len() + 1)
        })?;

        if moved > 0 {
            log_fs_debug!("Renamed", from = from.as_str(), to = to.as_str(), records = moved);
        }
        Ok(())
    }

    // ========================================================================
    // Attribute updates
    // ========================================================================

    fn update_record(
        &self,
        op: &'static str,
        path: &str,
        mut apply: impl FnMut(&mut FileRecord),
    ) -> FsResult<()> {
        let target = resolve(path)?;
        self.transact(op, |txn| {
            let mut record = txn
                .get(&target)?
                .ok_or_else(|| FsError::NotFound(target.to_string()))?;
            apply(&mut record);
            txn.put(&target, &record)?;
            Ok(())
        })
    }

    /// Change the permission bits. Nothing enforces them.
    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.update_record("chmod", path, |record| record.mode = mode & MODE_MASK)
    }

    /// Set the modification time. Access times are not tracked, so `_atime`
    /// is accepted for interface compatibility and dropped.
    pub fn chtimes(&self, path: &str, _atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let mtime = to_nanos(mtime);
        self.update_record("chtimes", path, |record| record.mtime = mtime)
    }

    /// Record owner ids. Nothing enforces them.
    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.update_record("chown", path, |record| {
            record.uid = uid;
            record.gid = gid;
        })
    }
}

pub(crate) fn resolve(path: &str) -> FsResult<VfsPath> {
    Ok(VfsPath::parse(path)?)
}

/// Fail unless `path`'s parent exists and is a directory.
pub(crate) fn require_parent_dir(txn: &IndexTxn<'_>, path: &VfsPath) -> FsResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match txn.get(&parent)? {
        Some(record) if record.is_dir() => Ok(()),
        Some(_) => Err(FsError::NotADirectory(parent.to_string())),
        None => Err(FsError::NotFound(parent.to_string())),
    }
}
