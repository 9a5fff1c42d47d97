use std::fmt;

use tokio::sync::oneshot;

use crate::data_capture::StdioStream;
use crate::error_handling::types::SessionError;
use crate::session_management::Session;

/// Input of the router task.
#[derive(Debug)]
pub enum GatewayEvent {
    /// A client connected and the transport issued its session.
    SessionOpened(Session),
    /// The transport observed the end of a session.
    SessionClosed {
        session_id: String,
        reason: CloseReason,
    },
    /// A client posted a message body for `session_id`. The reply tells the transport whether
    /// the message was accepted.
    ClientPost {
        session_id: String,
        body: Vec<u8>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Raw bytes read from one of the child's output pipes.
    ChildOutput { stream: StdioStream, chunk: Vec<u8> },
}

/// Why a session left the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// The client's stream was dropped.
    Disconnected,
    /// Queuing a message for the client failed.
    SendFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Disconnected => write!(f, "client disconnected"),
            CloseReason::SendFailed(e) => write!(f, "send failed: {}", e),
        }
    }
}
