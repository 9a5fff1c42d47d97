//! Session management core module.
//!
//! This module provides the core types for tracking connected clients: the session entry
//! with its send capability, the registry keyed by session identifier, and the session
//! lifecycle status.

use serde::{Deserialize, Serialize};

/// Submodule for session data structures and utilities.
pub mod session;
/// Submodule for the session registry.
pub mod session_registry;

pub use session::Session;
pub use session_registry::SessionRegistry;

/// Represents the current status of a session.
///
/// Variants:
/// - `Active`: The session is registered and receives broadcasts.
/// - `Closed`: The client went away or the transport closed the stream.
/// - `Error`: A send to the session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Closed,
    Error,
}
