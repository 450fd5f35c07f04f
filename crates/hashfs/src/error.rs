use std::io;

use hashfs_cas::CasError;
use hashfs_index::{IndexError, PathError};
use thiserror::Error;

pub type FsResult<T> = std::result::Result<T, FsError>;

/// Failure of one of the two stores underneath the engine.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("metadata index: {0}")]
    Index(#[from] IndexError),

    #[error("blob store: {0}")]
    Blob(#[from] CasError),

    #[error("{op}: transaction conflict persisted after {attempts} attempts: {source}")]
    ConflictRetriesExhausted {
        op: &'static str,
        attempts: u32,
        #[source]
        source: IndexError,
    },
}

/// Errors returned by filesystem operations.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("file exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid open options: {0}")]
    InvalidOptions(&'static str),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// Flat view of [`FsError`] for matching without caring about payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    InvalidPath,
    InvalidOptions,
    TransactionConflict,
    StorageFailure,
}

impl FsError {
    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsError::NotFound(_) => FsErrorKind::NotFound,
            FsError::AlreadyExists(_) => FsErrorKind::AlreadyExists,
            FsError::NotADirectory(_) => FsErrorKind::NotADirectory,
            FsError::IsADirectory(_) => FsErrorKind::IsADirectory,
            FsError::DirectoryNotEmpty(_) => FsErrorKind::DirectoryNotEmpty,
            FsError::InvalidPath(_) => FsErrorKind::InvalidPath,
            FsError::InvalidOptions(_) => FsErrorKind::InvalidOptions,
            FsError::Storage(StorageError::Index(e)) if e.is_conflict() => {
                FsErrorKind::TransactionConflict
            }
            FsError::Storage(_) => FsErrorKind::StorageFailure,
        }
    }

    /// Only index conflicts are worth another attempt; validation errors
    /// would just fail the same way again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FsErrorKind::TransactionConflict
    }
}

impl From<IndexError> for FsError {
    fn from(e: IndexError) -> Self {
        FsError::Storage(StorageError::Index(e))
    }
}

impl From<CasError> for FsError {
    fn from(e: CasError) -> Self {
        FsError::Storage(StorageError::Blob(e))
    }
}

impl From<PathError> for FsError {
    fn from(e: PathError) -> Self {
        FsError::InvalidPath(e.to_string())
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        let kind = match e.kind() {
            FsErrorKind::NotFound => io::ErrorKind::NotFound,
            FsErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            FsErrorKind::NotADirectory => io::ErrorKind::NotADirectory,
            FsErrorKind::IsADirectory => io::ErrorKind::IsADirectory,
            FsErrorKind::DirectoryNotEmpty => io::ErrorKind::DirectoryNotEmpty,
            FsErrorKind::InvalidPath | FsErrorKind::InvalidOptions => io::ErrorKind::InvalidInput,
            FsErrorKind::TransactionConflict | FsErrorKind::StorageFailure => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}
