//! Common data types used across the data_capture subsystem.

use serde::{Deserialize, Serialize};

/// Child output streams read by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StdioStream {
    /// Protocol messages, one JSON document per line.
    Stdout,
    /// Free-form diagnostics.
    Stderr,
}
