//! Storage subsystem
//!
//! This module provides abstractions and implementations for persisting the protocol log
//! records produced by the router.
//!
//! Components:
//! - `storage_trait`: the `LogStorage` trait defining a uniform async API.
//! - `types`: log records, their kinds and correlation updates.
//! - `database_storage`: ORM-based SQLite implementation using SeaORM.
//! - `db_entities`: SeaORM entity model for the database backend.
//! - `file_storage`: JSON-lines file implementation for simple persistence and inspection.
//! - `memory_storage`: in-process implementation for development and tests.
//! - `log_emitter`: the fire-and-forget queue between the router and a backend.

pub mod database_storage;
pub mod db_entities;
pub mod file_storage;
pub mod log_emitter;
pub mod memory_storage;
pub mod storage_trait;
pub mod types;

pub use log_emitter::LogEmitter;
pub use storage_trait::LogStorage;
pub use types::{LogKind, LogRecord, LogUpdate};
