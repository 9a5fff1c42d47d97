//! Storage Trait
//!
//! This module defines the `LogStorage` trait, the interface of every log record backend.
//!
//! Implementors are responsible for:
//! - Appending new records
//! - Correlating a response back onto the record of its request
//! - Reading back the records of one session
//!
//! All methods return a `Result`; callers on the routing path never see these errors, the
//! [`LogEmitter`](super::LogEmitter) only reports them.

use async_trait::async_trait;

use crate::error_handling::types::StorageError;
use crate::storage::types::{LogRecord, LogUpdate};

#[async_trait]
pub trait LogStorage: Send + Sync {
    /// Appends `record`.
    async fn insert(&self, record: &LogRecord) -> Result<(), StorageError>;

    /// Applies `patch` to the first record of `session_id` whose request identifier is
    /// `rpc_id`. Returns whether a record matched.
    async fn update(
        &self,
        session_id: &str,
        rpc_id: &str,
        patch: &LogUpdate,
    ) -> Result<bool, StorageError>;

    /// Retrieves the records of `session_id` in insertion order.
    async fn records_for_session(&self, session_id: &str) -> Result<Vec<LogRecord>, StorageError>;
}
