//! In-memory blob store.

use dashmap::DashMap;

use crate::{compute_hash, hash_to_hex, Blake3Hash, BlobStore, CasError, Result};

/// Blob store backed by a concurrent map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<Blake3Hash, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unique blobs held
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, data: &[u8]) -> Result<Blake3Hash> {
        let hash = compute_hash(data);
        self.blobs.entry(hash).or_insert_with(|| data.to_vec());
        Ok(hash)
    }

    fn get(&self, hash: &Blake3Hash) -> Result<Vec<u8>> {
        self.blobs
            .get(hash)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| CasError::NotFound {
                hash: hash_to_hex(hash),
            })
    }

    fn exists(&self, hash: &Blake3Hash) -> bool {
        self.blobs.contains_key(hash)
    }

    fn delete(&self, hash: &Blake3Hash) -> Result<()> {
        self.blobs
            .remove(hash)
            .map(|_| ())
            .ok_or_else(|| CasError::NotFound {
                hash: hash_to_hex(hash),
            })
    }

    fn hashes(&self) -> Result<Vec<Blake3Hash>> {
        Ok(self.blobs.iter().map(|entry| *entry.key()).collect())
    }
}
