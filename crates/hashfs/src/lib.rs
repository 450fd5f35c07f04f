//! # HashFS
//!
//! A virtual filesystem whose file contents live in a content-addressable
//! blob store and whose tree lives in a transactional metadata index.
//!
//! Identical content written under any number of paths is stored once.
//! Every mutating operation is a single index transaction, so directory
//! renames and recursive removals are atomic to concurrent readers.
//!
//! ```ignore
//! use hashfs::HashFs;
//! use hashfs_config::Config;
//!
//! let fs = HashFs::open_with_config(&Config::load()?)?;
//! fs.mkdir_all("/docs/2024", 0o755)?;
//! fs.write_file("/docs/2024/notes.txt", b"hello", 0o644)?;
//! assert_eq!(fs.read_file("/docs/2024/notes.txt")?, b"hello");
//! ```

pub mod engine;
pub mod error;
pub mod file;
pub mod gc;
pub mod snapshot;

pub use engine::{HashFs, HashFsOptions};
pub use error::{FsError, FsErrorKind, FsResult, StorageError};
pub use file::{HashFile, OpenOptions};
pub use gc::{FsStats, GcReport};
pub use snapshot::Snapshot;

pub use hashfs_cas::{BlobStore, CasStore, MemoryBlobStore};
pub use hashfs_index::{FileRecord, RecordKind, VfsPath};
