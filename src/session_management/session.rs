use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error_handling::types::SessionError;
use crate::session_management::SessionStatus;

/// One connected client.
///
/// The entry owns the sending half of the client's outbound queue; the transport holds the
/// receiving half and turns queued messages into stream events.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub source_addr: String,
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
    pub status: SessionStatus,
    sender: mpsc::Sender<Value>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        sender: mpsc::Sender<Value>,
        source_addr: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_addr: source_addr.into(),
            user_id: user_id.into(),
            connected_at: Utc::now(),
            status: SessionStatus::Active,
            sender,
        }
    }

    /// Queues `message` for the client without waiting.
    ///
    /// Fails when the client's stream is gone or its queue is full; either way the session
    /// can no longer be relied on.
    pub fn send(&self, message: &Value) -> Result<(), SessionError> {
        self.sender.try_send(message.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::SendFailed("outbound queue full".into()),
            TrySendError::Closed(_) => SessionError::SendFailed("stream closed".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_queues_message() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = Session::new("s1", tx, "127.0.0.1", "alice");
        session.send(&json!({"id": 1})).unwrap();
        assert_eq!(rx.try_recv().unwrap(), json!({"id": 1}));
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[test]
    fn send_fails_once_stream_is_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let session = Session::new("s1", tx, "", "");
        drop(rx);
        assert_eq!(
            session.send(&json!({})),
            Err(SessionError::SendFailed("stream closed".into()))
        );
    }

    #[test]
    fn send_fails_when_queue_is_full() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new("s1", tx, "", "");
        session.send(&json!(1)).unwrap();
        assert_eq!(
            session.send(&json!(2)),
            Err(SessionError::SendFailed("outbound queue full".into()))
        );
    }
}
