//! # hashfs-index
//!
//! Metadata side of HashFS: where every logical path lives and what it
//! points at.
//!
//! - [`path`]: normalization of user paths into [`VfsPath`] and the
//!   `(parent, name)` [`CanonicalKey`] encoding used as LMDB keys
//! - [`record`]: the [`FileRecord`] stored per path
//! - [`lmdb`]: the [`MetadataIndex`] with read-write and snapshot transactions

pub mod lmdb;
pub mod path;
pub mod record;

pub use lmdb::{IndexError, IndexOptions, IndexReader, IndexResult, IndexTxn, MetadataIndex};
pub use path::{CanonicalKey, PathError, VfsPath};
pub use record::{now_nanos, to_nanos, FileRecord, RecordKind};
