//! Filesystem storage backend.
//!
//! One pretty-printed `out_<build_id>.json` per build inside a folder.
//! Suitable for single-node setups without a database.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use buildtrace_shared::{BuildRecord, BuildtraceError, Result};

use crate::StoragePort;

/// Stores each build record as a JSON file in `folder`.
pub struct FileStorage {
    folder: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `folder`, creating it if missing.
    pub fn new(folder: &Path) -> Result<Self> {
        std::fs::create_dir_all(folder).map_err(|e| BuildtraceError::io(folder, e))?;
        Ok(Self {
            folder: folder.to_path_buf(),
        })
    }

    fn record_path(&self, build_id: &str) -> PathBuf {
        self.folder.join(format!("out_{build_id}.json"))
    }
}

#[async_trait]
impl StoragePort for FileStorage {
    async fn has(&self, build_id: &str) -> Result<bool> {
        let path = self.record_path(build_id);
        match tokio::fs::try_exists(&path).await {
            Ok(exists) => Ok(exists),
            Err(e) => Err(BuildtraceError::io(path, e)),
        }
    }

    async fn get(&self, build_id: &str) -> Result<BuildRecord> {
        let path = self.record_path(build_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BuildtraceError::not_found(build_id));
            }
            Err(e) => return Err(BuildtraceError::io(path, e)),
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| BuildtraceError::Storage(format!("corrupt record {build_id}: {e}")))
    }

    async fn put(&self, record: &BuildRecord, build_id: &str) -> Result<()> {
        let path = self.record_path(build_id);
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| BuildtraceError::Storage(format!("serialize record: {e}")))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| BuildtraceError::io(&path, e))?;
        tracing::debug!(?path, "record written");
        Ok(())
    }

    async fn remove(&self, build_id: &str) -> Result<()> {
        let path = self.record_path(build_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildtraceError::io(path, e)),
        }
    }
}
