use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session_management::Session;

/// What a log record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// A JSON-RPC message.
    Rpc,
    /// A child output line that is not JSON.
    System,
    /// Child error stream output.
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Rpc => "rpc",
            LogKind::System => "system",
            LogKind::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "rpc" => Some(LogKind::Rpc),
            "system" => Some(LogKind::System),
            "error" => Some(LogKind::Error),
            _ => None,
        }
    }
}

/// One observed protocol event, attributed to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub source_addr: String,
    pub user_id: String,
    pub session_id: String,
    pub kind: LogKind,
    /// Parsed message for `rpc`, raw text for `system` and `error`.
    pub payload: Value,
    /// Canonical JSON text of the message `id`, the correlation key of responses.
    pub rpc_id: Option<String>,
    /// Response correlated back onto this record, if any.
    pub response: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn rpc(session: &Session, message: &Value) -> Self {
        let mut record = Self::new(session, LogKind::Rpc, message.clone());
        record.rpc_id = rpc_id_of(message);
        record
    }

    pub fn system(session: &Session, line: &str) -> Self {
        Self::new(session, LogKind::System, Value::String(line.to_string()))
    }

    pub fn error(session: &Session, text: &str) -> Self {
        Self::new(session, LogKind::Error, Value::String(text.to_string()))
    }

    fn new(session: &Session, kind: LogKind, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            source_addr: session.source_addr.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            kind,
            payload,
            rpc_id: None,
            response: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Patch applied to a request's record when its response is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogUpdate {
    pub response: Value,
    pub updated_at: DateTime<Utc>,
}

impl LogUpdate {
    pub fn from_response(message: &Value) -> Self {
        Self {
            response: message.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// Correlation key of a JSON-RPC message: its `id` as JSON text, absent when missing or null.
///
/// `1` and `"1"` produce different keys.
pub fn rpc_id_of(message: &Value) -> Option<String> {
    match message.get("id") {
        None | Some(Value::Null) => None,
        Some(id) => Some(id.to_string()),
    }
}
