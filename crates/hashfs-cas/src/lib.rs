//! # hashfs-cas
//!
//! Content-Addressable Storage (CAS) for HashFS.
//!
//! Blobs are keyed by the BLAKE3 hash of their bytes, so storing identical
//! content twice is a no-op on the second write. The engine consumes this
//! crate only through the [`BlobStore`] trait; two implementations ship here:
//!
//! - [`CasStore`]: filesystem-backed, 2-level fan-out, crash-safe writes
//! - [`MemoryBlobStore`]: in-process map, for tests and ephemeral instances
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! └── blake3/
//!     └── ab/
//!         └── cd/
//!             └── abcd1234...efgh
//! ```

mod memory;

pub use memory::MemoryBlobStore;

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::instrument;
use walkdir::WalkDir;

/// BLAKE3 hash type (32 bytes)
pub type Blake3Hash = [u8; 32];

/// Errors that can occur during CAS operations
#[derive(Error, Debug)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Blob not found: {hash}")]
    NotFound { hash: String },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Contract between the filesystem engine and whatever stores its bytes.
///
/// Implementations must be idempotent on `put`: identical bytes always map to
/// the same hash, and concurrent writers of the same content must both
/// succeed.
pub trait BlobStore: Send + Sync {
    /// Store bytes, returning their content hash.
    fn put(&self, data: &[u8]) -> Result<Blake3Hash>;

    /// Fetch the bytes for `hash`, or `CasError::NotFound`.
    fn get(&self, hash: &Blake3Hash) -> Result<Vec<u8>>;

    /// Check whether a blob is present.
    fn exists(&self, hash: &Blake3Hash) -> bool;

    /// Remove a blob. Used by garbage collection only.
    fn delete(&self, hash: &Blake3Hash) -> Result<()>;

    /// Enumerate every stored hash.
    fn hashes(&self) -> Result<Vec<Blake3Hash>>;
}

/// Compute the BLAKE3 hash of the given bytes.
#[inline]
pub fn compute_hash(data: &[u8]) -> Blake3Hash {
    *blake3::hash(data).as_bytes()
}

/// Convert a hash to its hex string representation.
#[inline]
pub fn hash_to_hex(hash: &Blake3Hash) -> String {
    hex::encode(hash)
}

/// Parse a hex string into a hash.
pub fn hex_to_hash(hex_str: &str) -> Option<Blake3Hash> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut hash).ok()?;
    Some(hash)
}

/// Filesystem-backed content-addressable store.
#[derive(Debug, Clone)]
pub struct CasStore {
    root: PathBuf,
}

impl CasStore {
    /// Create a new CAS store at the given root directory.
    ///
    /// The directory will be created if it doesn't exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Get the root path of the CAS.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path where a blob with the given hash is stored: `blake3/ab/cd/<hex>`.
    fn blob_path(&self, hash: &Blake3Hash) -> PathBuf {
        let hex = hash_to_hex(hash);
        self.root
            .join("blake3")
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(&hex)
    }

    /// Store bytes in the CAS, returning the content hash.
    ///
    /// Writes go to a per-thread temp file that is fsynced and then renamed
    /// into place, so a reader never sees a partially written blob.
    #[instrument(skip(self, data), fields(len = data.len()), level = "debug")]
    pub fn store(&self, data: &[u8]) -> Result<Blake3Hash> {
        let hash = compute_hash(data);
        let path = self.blob_path(&hash);

        if path.exists() {
            return Ok(hash);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_name = format!(
            "{}.{}.{:?}.tmp",
            hash_to_hex(&hash),
            std::process::id(),
            std::thread::current().id()
        );
        let temp_path = path.with_file_name(&temp_name);
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;

        // Losing the rename race to another writer is fine: same content.
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            if path.exists() {
                return Ok(hash);
            }
            return Err(CasError::Io(e));
        }

        Ok(hash)
    }

    /// Retrieve bytes from the CAS by hash, verifying integrity on read.
    #[instrument(skip(self), level = "debug")]
    pub fn fetch(&self, hash: &Blake3Hash) -> Result<Vec<u8>> {
        let path = self.blob_path(hash);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::NotFound {
                    hash: hash_to_hex(hash),
                })
            }
            Err(e) => return Err(CasError::Io(e)),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let actual = compute_hash(&data);
        if actual != *hash {
            return Err(CasError::HashMismatch {
                expected: hash_to_hex(hash),
                actual: hash_to_hex(&actual),
            });
        }

        Ok(data)
    }

    /// Delete a blob from the CAS.
    pub fn remove(&self, hash: &Blake3Hash) -> Result<()> {
        match fs::remove_file(self.blob_path(hash)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CasError::NotFound {
                hash: hash_to_hex(hash),
            }),
            Err(e) => Err(CasError::Io(e)),
        }
    }

    /// Walk `blake3/ab/cd/` and yield `(hash, size)` for every finished blob.
    fn walk_blobs(&self) -> Result<Vec<(Blake3Hash, u64)>> {
        let blake3_dir = self.root.join("blake3");
        if !blake3_dir.exists() {
            return Ok(Vec::new());
        }

        let mut blobs = Vec::new();
        for entry in WalkDir::new(&blake3_dir).min_depth(3).max_depth(3) {
            let entry = entry.map_err(|e| CasError::Io(io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            // Temp files from in-flight writes carry a suffix and fail to parse.
            let Some(hash) = entry.file_name().to_str().and_then(hex_to_hash) else {
                continue;
            };
            let size = entry
                .metadata()
                .map_err(|e| CasError::Io(io::Error::other(e)))?
                .len();
            blobs.push((hash, size));
        }
        Ok(blobs)
    }

    /// Get statistics about the CAS.
    pub fn stats(&self) -> Result<CasStats> {
        let blobs = self.walk_blobs()?;
        Ok(CasStats {
            blob_count: blobs.len() as u64,
            total_bytes: blobs.iter().map(|(_, size)| size).sum(),
        })
    }
}

impl BlobStore for CasStore {
    fn put(&self, data: &[u8]) -> Result<Blake3Hash> {
        self.store(data)
    }

    fn get(&self, hash: &Blake3Hash) -> Result<Vec<u8>> {
        self.fetch(hash)
    }

    fn exists(&self, hash: &Blake3Hash) -> bool {
        self.blob_path(hash).exists()
    }

    fn delete(&self, hash: &Blake3Hash) -> Result<()> {
        self.remove(hash)
    }

    fn hashes(&self) -> Result<Vec<Blake3Hash>> {
        Ok(self
            .walk_blobs()?
            .into_iter()
            .map(|(hash, _)| hash)
            .collect())
    }
}

/// Statistics about the CAS store
#[derive(Debug, Clone, Default)]
pub struct CasStats {
    /// Number of unique blobs stored
    pub blob_count: u64,
    /// Total bytes stored (deduplicated)
    pub total_bytes: u64,
}

impl CasStats {
    /// Calculate average blob size
    pub fn avg_blob_size(&self) -> u64 {
        if self.blob_count == 0 {
            0
        } else {
            self.total_bytes / self.blob_count
        }
    }
}
