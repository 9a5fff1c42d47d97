//! Fire-and-forget dispatch of log records to a [`LogStorage`] backend.
//!
//! The router hands records to a [`LogEmitter`] and continues immediately. A single background
//! task applies the queued operations in order, so the insert of a request always reaches the
//! backend before the update correlating its response. Failures are reported through the `log`
//! facade and go nowhere else: they never remove a session or hold back a message.

use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::storage::storage_trait::LogStorage;
use crate::storage::types::{LogRecord, LogUpdate};

#[derive(Debug)]
enum LogOperation {
    Insert(LogRecord),
    Update {
        session_id: String,
        rpc_id: String,
        patch: LogUpdate,
    },
}

/// Handle used by the router to emit log records.
///
/// Cloning is cheap; the background task stops once every clone is dropped and the queue
/// is drained.
#[derive(Debug, Clone)]
pub struct LogEmitter {
    queue: Option<mpsc::Sender<LogOperation>>,
}

impl LogEmitter {
    /// Starts the background task writing to `storage`, with room for `capacity` pending
    /// operations.
    pub fn spawn(storage: Arc<dyn LogStorage>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(drain(storage, rx));
        (Self { queue: Some(tx) }, task)
    }

    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        Self { queue: None }
    }

    pub fn insert(&self, record: LogRecord) {
        self.enqueue(LogOperation::Insert(record));
    }

    pub fn update(&self, session_id: &str, rpc_id: &str, patch: LogUpdate) {
        self.enqueue(LogOperation::Update {
            session_id: session_id.to_string(),
            rpc_id: rpc_id.to_string(),
            patch,
        });
    }

    fn enqueue(&self, operation: LogOperation) {
        let Some(queue) = &self.queue else {
            return;
        };
        match queue.try_send(operation) {
            Ok(()) => {}
            Err(TrySendError::Full(op)) => {
                warn!("Log queue full, dropping {}", describe(&op));
            }
            Err(TrySendError::Closed(op)) => {
                error!("Log writer stopped, dropping {}", describe(&op));
            }
        }
    }
}

fn describe(operation: &LogOperation) -> String {
    match operation {
        LogOperation::Insert(record) => {
            format!("{} insert for session {}", record.kind.as_str(), record.session_id)
        }
        LogOperation::Update {
            session_id, rpc_id, ..
        } => format!("update of rpc id {} for session {}", rpc_id, session_id),
    }
}

async fn drain(storage: Arc<dyn LogStorage>, mut queue: mpsc::Receiver<LogOperation>) {
    while let Some(operation) = queue.recv().await {
        match &operation {
            LogOperation::Insert(record) => {
                if let Err(e) = storage.insert(record).await {
                    error!("Failed to insert log: {}", e);
                }
            }
            LogOperation::Update {
                session_id,
                rpc_id,
                patch,
            } => match storage.update(session_id, rpc_id, patch).await {
                Ok(true) => {}
                Ok(false) => debug!(
                    "[{}] no log record to correlate with rpc id {}",
                    session_id, rpc_id
                ),
                Err(e) => error!("Failed to update log: {}", e),
            },
        }
    }
    debug!("Log queue closed");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error_handling::types::StorageError;
    use crate::session_management::Session;
    use crate::storage::memory_storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend failing every call, counting the attempts.
    #[derive(Default)]
    pub(crate) struct FailingStorage {
        pub(crate) attempts: AtomicUsize,
    }

    #[async_trait]
    impl LogStorage for FailingStorage {
        async fn insert(&self, _record: &LogRecord) -> Result<(), StorageError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::ConnectionFailed("unreachable".into()))
        }

        async fn update(
            &self,
            _session_id: &str,
            _rpc_id: &str,
            _patch: &LogUpdate,
        ) -> Result<bool, StorageError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::ConnectionFailed("unreachable".into()))
        }

        async fn records_for_session(
            &self,
            _session_id: &str,
        ) -> Result<Vec<LogRecord>, StorageError> {
            Err(StorageError::ConnectionFailed("unreachable".into()))
        }
    }

    fn session() -> Session {
        let (tx, _rx) = mpsc::channel(1);
        Session::new("s1", tx, "127.0.0.1", "")
    }

    #[tokio::test]
    async fn insert_then_update_are_applied_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let (emitter, task) = LogEmitter::spawn(storage.clone(), 16);

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": "pong"});
        emitter.insert(LogRecord::rpc(&session(), &request));
        emitter.update("s1", "1", LogUpdate::from_response(&response));
        drop(emitter);
        task.await.unwrap();

        let records = storage.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].response, Some(response));
    }

    #[tokio::test]
    async fn failures_are_contained_and_every_operation_attempted() {
        let storage = Arc::new(FailingStorage::default());
        let (emitter, task) = LogEmitter::spawn(storage.clone(), 16);

        emitter.insert(LogRecord::system(&session(), "a"));
        emitter.insert(LogRecord::system(&session(), "b"));
        emitter.update("s1", "1", LogUpdate::from_response(&json!({"id": 1})));
        drop(emitter);
        task.await.unwrap();

        assert_eq!(storage.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_waiting() {
        let storage = Arc::new(MemoryStorage::new());
        let (emitter, task) = LogEmitter::spawn(storage.clone(), 1);

        // The writer task has not run yet on this single-threaded runtime.
        emitter.insert(LogRecord::system(&session(), "kept"));
        emitter.insert(LogRecord::system(&session(), "dropped"));
        drop(emitter);
        task.await.unwrap();

        let records = storage.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, json!("kept"));
    }

    #[test]
    fn disabled_emitter_accepts_everything() {
        let emitter = LogEmitter::disabled();
        emitter.insert(LogRecord::system(&session(), "ignored"));
    }
}
