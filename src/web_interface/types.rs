use std::time::Duration;

use serde::Serialize;

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Parameters shared by every event stream.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Announced to the client in the `endpoint` event, completed with `?sessionId=<id>`.
    pub message_endpoint: String,
    pub session_buffer: usize,
    pub keep_alive: Duration,
}
