//! LMDB-backed metadata index.
//!
//! One database maps canonical keys to [`FileRecord`]s. LMDB gives us
//! serializable write transactions (one writer at a time, per environment)
//! and MVCC read snapshots, which is exactly the isolation the engine needs:
//! a check-then-act inside an [`IndexTxn`] cannot race another writer, and an
//! [`IndexReader`] never observes a half-applied transaction.

use std::collections::HashSet;
use std::path::Path;

use hashfs_cas::Blake3Hash;
use heed::types::{Bytes, SerdeBincode};
use heed::{Database, Env, EnvOpenOptions, MdbError, RoTxn, RwTxn};
use thiserror::Error;
use tracing::debug;

use crate::path::{CanonicalKey, VfsPath};
use crate::record::FileRecord;

/// Metadata index errors
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index corrupted: {0}")]
    Corrupted(String),
}

impl IndexError {
    /// Conditions that go away if the transaction is simply tried again.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            IndexError::Heed(heed::Error::Mdb(
                MdbError::ReadersFull | MdbError::MapResized | MdbError::BadTxn
            ))
        )
    }
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Tunables for opening the LMDB environment.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub map_size: usize,
    pub max_readers: u32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            map_size: MetadataIndex::DEFAULT_MAP_SIZE,
            max_readers: MetadataIndex::MAX_READERS,
        }
    }
}

type RecordDb = Database<Bytes, SerdeBincode<FileRecord>>;

/// Transactional path → record store.
///
/// Cheap to clone; clones share the same environment.
#[derive(Clone)]
pub struct MetadataIndex {
    env: Env,
    records: RecordDb,
}

impl MetadataIndex {
    /// Default LMDB map size: 1GB
    pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

    /// Maximum concurrent readers
    pub const MAX_READERS: u32 = 128;

    /// Open or create an index in the directory at `path`.
    pub fn open<P: AsRef<Path>>(path: P, options: &IndexOptions) -> IndexResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        // SAFETY: each environment is opened once per process through this
        // constructor and the files are never touched by anything but LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.map_size)
                .max_readers(options.max_readers)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let records = env.create_database(&mut wtxn, Some("records"))?;
        wtxn.commit()?;

        debug!("Opened metadata index at {:?}", path);

        Ok(Self { env, records })
    }

    /// Begin a read-write transaction. Blocks while another writer is active.
    ///
    /// Dropping the transaction without calling [`IndexTxn::commit`] rolls it
    /// back.
    pub fn write_txn(&self) -> IndexResult<IndexTxn<'_>> {
        Ok(IndexTxn {
            txn: self.env.write_txn()?,
            records: self.records,
        })
    }

    /// Begin a read-only snapshot.
    pub fn read_txn(&self) -> IndexResult<IndexReader<'_>> {
        Ok(IndexReader {
            txn: self.env.read_txn()?,
            records: self.records,
        })
    }

    /// Flush LMDB to disk
    pub fn sync(&self) -> IndexResult<()> {
        self.env.force_sync()?;
        Ok(())
    }

    /// Directory holding the LMDB files
    pub fn path(&self) -> &Path {
        self.env.path()
    }
}

fn get_record(db: &RecordDb, txn: &RoTxn, path: &VfsPath) -> IndexResult<Option<FileRecord>> {
    Ok(db.get(txn, &path.key().to_bytes())?)
}

fn scan_prefix(
    db: &RecordDb,
    txn: &RoTxn,
    prefix: &[u8],
    out: &mut Vec<(VfsPath, FileRecord)>,
) -> IndexResult<()> {
    for item in db.prefix_iter(txn, prefix)? {
        let (key, record) = item?;
        let key = CanonicalKey::from_bytes(key)
            .ok_or_else(|| IndexError::Corrupted(format!("undecodable key {:?}", key)))?;
        out.push((key.path(), record));
    }
    Ok(())
}

fn list_children(db: &RecordDb, txn: &RoTxn, dir: &VfsPath) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
    let mut children = Vec::new();
    scan_prefix(db, txn, &dir.children_prefix(), &mut children)?;
    Ok(children)
}

fn list_descendants(
    db: &RecordDb,
    txn: &RoTxn,
    dir: &VfsPath,
) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
    let mut found = Vec::new();
    for prefix in dir.descendant_prefixes() {
        scan_prefix(db, txn, &prefix, &mut found)?;
    }
    Ok(found)
}

fn all_records(db: &RecordDb, txn: &RoTxn) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
    let mut found = Vec::new();
    for item in db.iter(txn)? {
        let (key, record) = item?;
        let key = CanonicalKey::from_bytes(key)
            .ok_or_else(|| IndexError::Corrupted(format!("undecodable key {:?}", key)))?;
        found.push((key.path(), record));
    }
    Ok(found)
}

/// Read-write transaction over the index.
pub struct IndexTxn<'env> {
    txn: RwTxn<'env>,
    records: RecordDb,
}

impl IndexTxn<'_> {
    pub fn get(&self, path: &VfsPath) -> IndexResult<Option<FileRecord>> {
        get_record(&self.records, &self.txn, path)
    }

    pub fn put(&mut self, path: &VfsPath, record: &FileRecord) -> IndexResult<()> {
        self.records
            .put(&mut self.txn, &path.key().to_bytes(), record)?;
        Ok(())
    }

    /// Delete the record at `path`, returning whether one existed.
    pub fn delete(&mut self, path: &VfsPath) -> IndexResult<bool> {
        Ok(self.records.delete(&mut self.txn, &path.key().to_bytes())?)
    }

    /// Direct children of `dir`, ordered by name.
    pub fn children(&self, dir: &VfsPath) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
        list_children(&self.records, &self.txn, dir)
    }

    /// True if any record lives directly under `dir`.
    pub fn has_children(&self, dir: &VfsPath) -> IndexResult<bool> {
        let mut iter = self.records.prefix_iter(&self.txn, &dir.children_prefix())?;
        Ok(iter.next().transpose()?.is_some())
    }

    /// Every record strictly below `dir`, at any depth.
    pub fn descendants(&self, dir: &VfsPath) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
        list_descendants(&self.records, &self.txn, dir)
    }

    /// Every content hash referenced by at least one record.
    pub fn referenced_hashes(&self) -> IndexResult<HashSet<Blake3Hash>> {
        Ok(all_records(&self.records, &self.txn)?
            .into_iter()
            .filter_map(|(_, record)| record.hash().copied())
            .collect())
    }

    /// Make every change in this transaction visible atomically.
    pub fn commit(self) -> IndexResult<()> {
        self.txn.commit()?;
        Ok(())
    }

    /// Discard every change in this transaction.
    pub fn rollback(self) {
        self.txn.abort();
    }
}

/// Read-only point-in-time view of the index.
pub struct IndexReader<'env> {
    txn: RoTxn<'env>,
    records: RecordDb,
}

impl IndexReader<'_> {
    pub fn get(&self, path: &VfsPath) -> IndexResult<Option<FileRecord>> {
        get_record(&self.records, &self.txn, path)
    }

    pub fn children(&self, dir: &VfsPath) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
        list_children(&self.records, &self.txn, dir)
    }

    pub fn descendants(&self, dir: &VfsPath) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
        list_descendants(&self.records, &self.txn, dir)
    }

    /// Every record in key order, root first.
    pub fn iter(&self) -> IndexResult<Vec<(VfsPath, FileRecord)>> {
        all_records(&self.records, &self.txn)
    }

    pub fn len(&self) -> IndexResult<u64> {
        Ok(self.records.len(&self.txn)?)
    }

    pub fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len()? == 0)
    }
}
