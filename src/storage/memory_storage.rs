use async_trait::async_trait;
use std::sync::Mutex;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::LogStorage;
use crate::storage::types::{LogRecord, LogUpdate};

/// Keeps log records in process memory. Everything is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, in insertion order.
    pub fn records(&self) -> Result<Vec<LogRecord>, StorageError> {
        self.records
            .lock()
            .map(|records| records.clone())
            .map_err(|_| StorageError::ReadFailed("memory store poisoned".into()))
    }
}

#[async_trait]
impl LogStorage for MemoryStorage {
    async fn insert(&self, record: &LogRecord) -> Result<(), StorageError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StorageError::WriteFailed("memory store poisoned".into()))?;
        records.push(record.clone());
        Ok(())
    }

    async fn update(
        &self,
        session_id: &str,
        rpc_id: &str,
        patch: &LogUpdate,
    ) -> Result<bool, StorageError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StorageError::WriteFailed("memory store poisoned".into()))?;
        let found = records
            .iter_mut()
            .find(|r| r.session_id == session_id && r.rpc_id.as_deref() == Some(rpc_id));
        match found {
            Some(record) => {
                record.response = Some(patch.response.clone());
                record.updated_at = patch.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn records_for_session(&self, session_id: &str) -> Result<Vec<LogRecord>, StorageError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }
}
