//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage a throwaway metadata index directory
//! and blob root per test, plus a `Config` pointing at them.
//!
//! # Usage
//!
//! ```ignore
//! use hashfs_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new().unwrap();
//! // env.index_dir and env.blob_root are unique to this test
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Map size used by test environments; small enough to keep tmpfs happy.
const TEST_MAP_SIZE: usize = 64 * 1024 * 1024;

/// Isolated test environment with unique storage paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// LMDB environment directory
    pub index_dir: PathBuf,
    /// Blob store root
    pub blob_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let index_dir = root.join("index.lmdb");
        let blob_root = root.join("blobs");

        std::fs::create_dir_all(&index_dir)?;
        std::fs::create_dir_all(&blob_root)?;

        Ok(Self {
            _temp_dir: temp_dir,
            index_dir,
            blob_root,
            test_id,
        })
    }

    /// A `Config` whose storage section points into this environment.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.storage.index_dir = self.index_dir.clone();
        config.storage.blob_root = self.blob_root.clone();
        config.index.map_size = TEST_MAP_SIZE;
        config
    }
}
