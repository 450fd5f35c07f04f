//! File content: opening, buffered handles, and committing new content.
//!
//! Content always reaches the blob store before the record that references
//! it is written. The record update re-checks that the blob is still present
//! inside the same write transaction, which closes the window where a
//! concurrent garbage collection could remove a freshly stored, not yet
//! referenced blob.

use std::io::{self, Read, Seek, SeekFrom, Write};

use hashfs_cas::{Blake3Hash, BlobStore};
use hashfs_config::{log_fs_debug, log_fs_warn};
use hashfs_index::{now_nanos, FileRecord, RecordKind, VfsPath};

use crate::engine::{require_parent_dir, resolve, HashFs, MODE_MASK};
use crate::error::{FsError, FsResult};

/// How a file is opened, in the shape of `std::fs::OpenOptions`.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
    create_new: bool,
    mode: Option<u32>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.write = write;
        self
    }

    /// Every write goes to the end of the file. Implies `write`.
    pub fn append(&mut self, append: bool) -> &mut Self {
        self.append = append;
        self
    }

    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.truncate = truncate;
        self
    }

    pub fn create(&mut self, create: bool) -> &mut Self {
        self.create = create;
        self
    }

    /// Create the file, failing if anything already exists at the path.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.create_new = create_new;
        self
    }

    /// Permission bits for a newly created file.
    pub fn mode(&mut self, mode: u32) -> &mut Self {
        self.mode = Some(mode);
        self
    }

    fn writable(&self) -> bool {
        self.write || self.append
    }

    fn validate(&self) -> FsResult<()> {
        if !self.read && !self.writable() {
            return Err(FsError::InvalidOptions("neither read nor write access requested"));
        }
        if !self.writable() && (self.truncate || self.create || self.create_new) {
            return Err(FsError::InvalidOptions("create or truncate requires write access"));
        }
        if self.append && self.truncate {
            return Err(FsError::InvalidOptions("append and truncate are mutually exclusive"));
        }
        Ok(())
    }
}

/// Whether committing content may create the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    MustExist,
    CreateIfMissing,
}

impl<B: BlobStore> HashFs<B> {
    /// Open a file read-only.
    pub fn open(&self, path: &str) -> FsResult<HashFile<B>> {
        self.open_file(path, OpenOptions::new().read(true))
    }

    /// Create or truncate a file and open it for reading and writing.
    pub fn create(&self, path: &str) -> FsResult<HashFile<B>> {
        self.open_file(
            path,
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true),
        )
    }

    /// Open a file with explicit options.
    ///
    /// Opening a directory fails with `IsADirectory`; use
    /// [`HashFs::read_dir`] to list it.
    pub fn open_file(&self, path: &str, options: &OpenOptions) -> FsResult<HashFile<B>> {
        options.validate()?;
        let target = resolve(path)?;
        let mode = options.mode.unwrap_or(self.options.file_mode) & MODE_MASK;
        let fresh = options.truncate || options.create || options.create_new;

        // Empty content is stored up front so the record written below never
        // references a missing blob.
        let empty = if fresh { Some(self.blobs.put(b"")?) } else { None };

        let (record, truncated) = self.transact("open", |txn| {
            match txn.get(&target)? {
                Some(record) if record.is_dir() => Err(FsError::IsADirectory(target.to_string())),
                Some(_) if options.create_new => Err(FsError::AlreadyExists(target.to_string())),
                Some(mut record) if options.truncate => {
                    let hash = empty_hash(empty)?;
                    self.ensure_blob(&hash, b"")?;
                    record.kind = RecordKind::File { hash, size: 0 };
                    record.mtime = now_nanos();
                    txn.put(&target, &record)?;
                    Ok((record, true))
                }
                Some(record) => Ok((record, false)),
                None if options.create || options.create_new => {
                    require_parent_dir(txn, &target)?;
                    let hash = empty_hash(empty)?;
                    self.ensure_blob(&hash, b"")?;
                    let record = FileRecord::new_file(target.name(), hash, 0, mode, now_nanos());
                    txn.put(&target, &record)?;
                    Ok((record, true))
                }
                None => Err(FsError::NotFound(target.to_string())),
            }
        })?;

        let data = match (truncated, record.hash()) {
            (false, Some(hash)) => self.blobs.get(hash)?,
            _ => Vec::new(),
        };

        log_fs_debug!("Opened file", path = target.as_str(), size = data.len());

        Ok(HashFile {
            fs: self.clone(),
            path: target,
            record,
            data,
            pos: 0,
            readable: options.read,
            writable: options.writable(),
            append: options.append,
            dirty: false,
        })
    }

    /// Replace the content of `path` with `data`, creating the file if it is
    /// missing. Mode applies only on creation.
    pub fn write_file(&self, path: &str, data: &[u8], mode: u32) -> FsResult<FileRecord> {
        let target = resolve(path)?;
        self.commit_content(&target, data, Disposition::CreateIfMissing, mode & MODE_MASK)
    }

    /// Whole content of the file at `path`.
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let mut file = self.open(path)?;
        Ok(std::mem::take(&mut file.data))
    }

    /// Store `data` in the blob store, then point the record at it.
    fn commit_content(
        &self,
        target: &VfsPath,
        data: &[u8],
        disposition: Disposition,
        mode: u32,
    ) -> FsResult<FileRecord> {
        let hash = self.blobs.put(data)?;
        let size = data.len() as u64;

        let record = self.transact("write", |txn| {
            let mut record = match txn.get(target)? {
                Some(record) if record.is_dir() => {
                    return Err(FsError::IsADirectory(target.to_string()))
                }
                Some(record) => record,
                None if disposition == Disposition::MustExist => {
                    return Err(FsError::NotFound(target.to_string()))
                }
                None => {
                    require_parent_dir(txn, target)?;
                    FileRecord::new_file(target.name(), hash, size, mode, 0)
                }
            };
            self.ensure_blob(&hash, data)?;
            record.kind = RecordKind::File { hash, size };
            record.mtime = now_nanos();
            txn.put(target, &record)?;
            Ok(record)
        })?;

        log_fs_debug!("Committed content", path = target.as_str(), size = size);
        Ok(record)
    }

    /// Re-store `data` if a collection removed it after it was first written.
    /// Must be called inside the write transaction that references `hash`.
    fn ensure_blob(&self, hash: &Blake3Hash, data: &[u8]) -> FsResult<()> {
        if !self.blobs.exists(hash) {
            log_fs_warn!("Blob collected before commit, storing again", size = data.len());
            self.blobs.put(data)?;
        }
        Ok(())
    }
}

fn empty_hash(hash: Option<Blake3Hash>) -> FsResult<Blake3Hash> {
    hash.ok_or(FsError::InvalidOptions("file creation without write access"))
}

/// An open file.
///
/// The whole content is buffered in memory. Writes become visible to other
/// callers only on [`HashFile::sync`] (also run by `flush`, [`HashFile::close`]
/// and, best effort, on drop), which stores the buffer as a new blob and
/// repoints the record in one transaction.
pub struct HashFile<B: BlobStore> {
    fs: HashFs<B>,
    path: VfsPath,
    record: FileRecord,
    data: Vec<u8>,
    pos: u64,
    readable: bool,
    writable: bool,
    append: bool,
    dirty: bool,
}

impl<B: BlobStore> HashFile<B> {
    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    /// Record as of open or the last sync.
    pub fn metadata(&self) -> &FileRecord {
        &self.record
    }

    /// Current buffered length, including unsynced writes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Truncate or zero-extend the buffered content.
    pub fn set_len(&mut self, size: u64) -> io::Result<()> {
        if !self.writable {
            return Err(not_writable());
        }
        let size = buffer_offset(size)?;
        if size < self.data.len() {
            self.data.truncate(size);
        } else {
            self.grow_to(size)?;
        }
        self.dirty = true;
        Ok(())
    }

    fn grow_to(&mut self, len: usize) -> io::Result<()> {
        if len > self.data.len() {
            self.data
                .try_reserve(len - self.data.len())
                .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
            self.data.resize(len, 0);
        }
        Ok(())
    }

    /// Commit buffered writes. A no-op when nothing changed.
    pub fn sync(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        self.record = self.fs.commit_content(
            &self.path,
            &self.data,
            Disposition::MustExist,
            self.record.mode,
        )?;
        self.dirty = false;
        Ok(())
    }

    /// Commit buffered writes and release the handle.
    pub fn close(mut self) -> FsResult<()> {
        self.sync()
    }
}

impl<B: BlobStore> Read for HashFile<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not opened for reading",
            ));
        }
        let start = usize::try_from(self.pos)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<B: BlobStore> Write for HashFile<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(not_writable());
        }
        if self.append {
            self.pos = self.data.len() as u64;
        }
        let start = buffer_offset(self.pos)?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| too_large(self.pos))?;
        self.grow_to(end)?;
        self.data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.sync()?)
    }
}

impl<B: BlobStore> Seek for HashFile<B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.data.len() as u64, n),
            SeekFrom::Current(n) => (self.pos, n),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

fn not_writable() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "file not opened for writing")
}

fn too_large(offset: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("offset {offset} is beyond the addressable file size"),
    )
}

/// Buffer index for a file offset, rejecting offsets no buffer can reach.
fn buffer_offset(offset: u64) -> io::Result<usize> {
    usize::try_from(offset)
        .ok()
        .filter(|n| *n <= isize::MAX as usize)
        .ok_or_else(|| too_large(offset))
}

impl<B: BlobStore> Drop for HashFile<B> {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            log_fs_warn!(
                "Dropping file with unsynced writes",
                path = self.path.as_str(),
                error = tracing::field::display(&e)
            );
        }
    }
}
