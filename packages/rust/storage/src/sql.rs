//! libSQL storage backend.
//!
//! One row per build in the `builds` table, holding the record JSON.
//! Schema changes go through versioned migrations applied on open.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, Database, params};

use buildtrace_shared::{BuildRecord, BuildtraceError, Result};

use crate::migrations;
use crate::StoragePort;

/// Relational storage handle wrapping a libSQL database.
pub struct SqlStorage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl SqlStorage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| BuildtraceError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BuildtraceError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| BuildtraceError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BuildtraceError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }
}

#[async_trait]
impl StoragePort for SqlStorage {
    async fn has(&self, build_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM builds WHERE build_id = ?1 LIMIT 1",
                params![build_id],
            )
            .await
            .map_err(|e| BuildtraceError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(BuildtraceError::Storage(e.to_string())),
        }
    }

    async fn get(&self, build_id: &str) -> Result<BuildRecord> {
        let mut rows = self
            .conn
            .query(
                "SELECT record FROM builds WHERE build_id = ?1",
                params![build_id],
            )
            .await
            .map_err(|e| BuildtraceError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| BuildtraceError::Storage(e.to_string()))?;
                serde_json::from_str(&json)
                    .map_err(|e| BuildtraceError::Storage(format!("corrupt record: {e}")))
            }
            Ok(None) => Err(BuildtraceError::not_found(build_id)),
            Err(e) => Err(BuildtraceError::Storage(e.to_string())),
        }
    }

    async fn put(&self, record: &BuildRecord, build_id: &str) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| BuildtraceError::Storage(format!("serialize record: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO builds (build_id, record, updated_at)
                 VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(build_id) DO UPDATE SET
                   record = excluded.record,
                   updated_at = excluded.updated_at",
                params![build_id, json.as_str()],
            )
            .await
            .map_err(|e| BuildtraceError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, build_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM builds WHERE build_id = ?1", params![build_id])
            .await
            .map_err(|e| BuildtraceError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_storage() -> SqlStorage {
        let tmp = std::env::temp_dir().join(format!("bt_sql_{}.db", uuid::Uuid::new_v4()));
        SqlStorage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("bt_sql_{}.db", uuid::Uuid::new_v4()));
        let s1 = SqlStorage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = SqlStorage::open(&tmp).await.expect("second open");
        assert_eq!(s2.schema_version().await, 1);
        let _ = std::fs::remove_file(&tmp);
    }

    #[tokio::test]
    async fn record_survives_reopen() {
        let tmp = std::env::temp_dir().join(format!("bt_sql_{}.db", uuid::Uuid::new_v4()));

        let record = BuildRecord {
            status: "SUCCESS".into(),
            ..BuildRecord::placeholder("b-1")
        };
        {
            let storage = SqlStorage::open(&tmp).await.expect("open");
            storage.put(&record, "b-1").await.expect("put");
        }

        let storage = SqlStorage::open(&tmp).await.expect("reopen");
        assert_eq!(storage.get("b-1").await.expect("get"), record);
        let _ = std::fs::remove_file(&tmp);
    }
}
