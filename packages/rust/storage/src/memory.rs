//! In-memory storage backend.
//!
//! Backs tests and throwaway setups; records live only as long as the
//! process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use buildtrace_shared::{BuildRecord, BuildtraceError, Result};

use crate::StoragePort;

/// Keeps build records in a process-local map.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, BuildRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn has(&self, build_id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(build_id))
    }

    async fn get(&self, build_id: &str) -> Result<BuildRecord> {
        self.records
            .read()
            .await
            .get(build_id)
            .cloned()
            .ok_or_else(|| BuildtraceError::not_found(build_id))
    }

    async fn put(&self, record: &BuildRecord, build_id: &str) -> Result<()> {
        self.records
            .write()
            .await
            .insert(build_id.to_string(), record.clone());
        Ok(())
    }

    async fn remove(&self, build_id: &str) -> Result<()> {
        self.records.write().await.remove(build_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_puts_on_distinct_keys() {
        let storage = Arc::new(MemoryStorage::new());

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                let build_id = format!("b-{i}");
                let record = BuildRecord::placeholder(&build_id);
                storage.put(&record, &build_id).await.expect("put");
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        for i in 0..16 {
            assert!(storage.has(&format!("b-{i}")).await.expect("has"));
        }
    }
}
