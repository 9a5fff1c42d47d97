use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::LogStorage;
use crate::storage::types::{LogRecord, LogUpdate};

/// Log records as JSON lines in `<base_path>/log_records.jsonl`.
///
/// Inserts append one line. Updates rewrite the whole file through a temporary file, so the
/// backend suits inspection and small deployments rather than long-running heavy traffic.
pub struct FileStorage {
    records_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    const LOG_FILE: &'static str = "log_records.jsonl";

    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path).map_err(|e| {
            error!("Failed to create log dir {}: {}", base_path.display(), e);
            StorageError::WriteFailed(e.to_string())
        })?;
        info!("FileStorage initialized at {}", base_path.display());
        Ok(Self {
            records_path: base_path.join(Self::LOG_FILE),
            write_lock: Mutex::new(()),
        })
    }

    async fn read_all(&self) -> Result<Vec<LogRecord>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.records_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!("Failed to read {}: {}", self.records_path.display(), e);
                return Err(StorageError::ReadFailed(e.to_string()));
            }
        };

        let mut records = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed line {} of {}: {}",
                    n + 1,
                    self.records_path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    async fn rewrite(&self, records: &[LogRecord]) -> Result<(), StorageError> {
        let mut content = String::new();
        for record in records {
            content.push_str(&encode(record)?);
        }
        let tmp = self.records_path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content).await.map_err(|e| {
            error!("Write failed {}: {}", tmp.display(), e);
            StorageError::WriteFailed(e.to_string())
        })?;
        tokio::fs::rename(&tmp, &self.records_path).await.map_err(|e| {
            error!("Rename failed {}: {}", tmp.display(), e);
            StorageError::WriteFailed(e.to_string())
        })
    }
}

fn encode(record: &LogRecord) -> Result<String, StorageError> {
    let mut line =
        serde_json::to_string(record).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

#[async_trait]
impl LogStorage for FileStorage {
    async fn insert(&self, record: &LogRecord) -> Result<(), StorageError> {
        let line = encode(record)?;
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.records_path)
            .await
            .map_err(|e| {
                error!("Open append failed {}: {}", self.records_path.display(), e);
                StorageError::WriteFailed(e.to_string())
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            error!("Write failed {}: {}", self.records_path.display(), e);
            StorageError::WriteFailed(e.to_string())
        })?;
        file.flush()
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        debug!("Appended {} byte(s) to {}", line.len(), self.records_path.display());
        Ok(())
    }

    async fn update(
        &self,
        session_id: &str,
        rpc_id: &str,
        patch: &LogUpdate,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let Some(record) = records
            .iter_mut()
            .find(|r| r.session_id == session_id && r.rpc_id.as_deref() == Some(rpc_id))
        else {
            return Ok(false);
        };
        record.response = Some(patch.response.clone());
        record.updated_at = patch.updated_at;
        self.rewrite(&records).await?;
        Ok(true)
    }

    async fn records_for_session(&self, session_id: &str) -> Result<Vec<LogRecord>, StorageError> {
        let _guard = self.write_lock.lock().await;
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }
}
