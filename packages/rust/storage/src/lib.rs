//! Pluggable persistence for build records.
//!
//! [`StoragePort`] is the contract the crawler and HTTP layer consume; the
//! backend behind it is selected by configuration:
//! - [`SqlStorage`] — libSQL database, one row per build
//! - [`FileStorage`] — one JSON file per build
//! - [`MemoryStorage`] — in-process map, used by tests and throwaway setups
//!
//! Every backend stores the whole [`BuildRecord`] as JSON; `put` is an
//! idempotent last-write-wins upsert, safe to call repeatedly with partial
//! snapshots of a still-running build.

mod file;
mod memory;
mod migrations;
mod sql;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use buildtrace_shared::{AppConfig, BuildRecord, BuildtraceError, Result};

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sql::SqlStorage;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Persistence contract for build records, keyed by build ID.
///
/// No cross-key transactions are required; concurrent `put`s on distinct
/// keys must not interfere.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Whether a record exists for `build_id`.
    async fn has(&self, build_id: &str) -> Result<bool>;

    /// Fetch the record for `build_id`, or [`BuildtraceError::NotFound`].
    async fn get(&self, build_id: &str) -> Result<BuildRecord>;

    /// Whole-record upsert. Replaces any existing record; never merges.
    async fn put(&self, record: &BuildRecord, build_id: &str) -> Result<()>;

    /// Delete the record for `build_id`. Removing an absent record is not an
    /// error, matching the upsert semantics of `put`.
    async fn remove(&self, build_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Open the storage backend named in the configuration.
pub async fn open_storage(config: &AppConfig) -> Result<Arc<dyn StoragePort>> {
    match config.storage.backend.as_str() {
        "sql" => {
            let storage = SqlStorage::open(Path::new(&config.storage.db_path)).await?;
            Ok(Arc::new(storage))
        }
        "file" => {
            let storage = FileStorage::new(Path::new(&config.storage.folder))?;
            Ok(Arc::new(storage))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        other => Err(BuildtraceError::config(format!(
            "unknown storage backend '{other}' (expected sql, file, or memory)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildtrace_shared::{LogLine, Stage};

    /// Contract assertions every backend must satisfy.
    async fn exercise_contract(storage: &dyn StoragePort) {
        let record = BuildRecord {
            status: "SUCCESS".into(),
            name: "pipeline".into(),
            id: "7".into(),
            build_id: "b-7".into(),
            stages: vec![Stage {
                name: "build".into(),
                logs: vec![LogLine::stamped("2020-01-01T00:00:00Z", "done")],
                ..Stage::default()
            }],
            ..BuildRecord::default()
        };

        assert!(!storage.has("b-7").await.expect("has"));
        assert!(
            storage.get("b-7").await.expect_err("get absent").is_not_found(),
            "absent record must yield NotFound"
        );

        // Put twice with the same record: idempotent upsert.
        storage.put(&record, "b-7").await.expect("put");
        storage.put(&record, "b-7").await.expect("put again");
        assert!(storage.has("b-7").await.expect("has"));
        assert_eq!(storage.get("b-7").await.expect("get"), record);

        // Last write wins, wholesale.
        let replaced = BuildRecord {
            status: "FAILED".into(),
            ..BuildRecord::placeholder("b-7")
        };
        storage.put(&replaced, "b-7").await.expect("replace");
        let fetched = storage.get("b-7").await.expect("get replaced");
        assert_eq!(fetched.status, "FAILED");
        assert!(fetched.stages.is_empty(), "replace must not merge stages");

        storage.remove("b-7").await.expect("remove");
        assert!(!storage.has("b-7").await.expect("has after remove"));
        storage.remove("b-7").await.expect("remove absent is ok");
    }

    #[tokio::test]
    async fn memory_backend_contract() {
        let storage = MemoryStorage::new();
        exercise_contract(&storage).await;
    }

    #[tokio::test]
    async fn file_backend_contract() {
        let tmp = std::env::temp_dir().join(format!("bt_store_{}", uuid::Uuid::new_v4()));
        let storage = FileStorage::new(&tmp).expect("create file storage");
        exercise_contract(&storage).await;
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn sql_backend_contract() {
        let tmp = std::env::temp_dir().join(format!("bt_store_{}.db", uuid::Uuid::new_v4()));
        let storage = SqlStorage::open(&tmp).await.expect("open sql storage");
        exercise_contract(&storage).await;
        let _ = std::fs::remove_file(&tmp);
    }

    #[tokio::test]
    async fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.storage.backend = "cassette-tape".into();
        let result = open_storage(&config).await;
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("cassette-tape"));
    }
}
