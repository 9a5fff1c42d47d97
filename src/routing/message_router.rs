use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::data_capture::{LineFramer, StdioStream};
use crate::error_handling::types::{GatewayError, SessionError};
use crate::routing::stdin_writer::StdinWriter;
use crate::routing::types::{CloseReason, GatewayEvent};
use crate::session_management::{Session, SessionRegistry, SessionStatus};
use crate::storage::types::rpc_id_of;
use crate::storage::{LogEmitter, LogRecord, LogUpdate};

/// Routes client messages to the child and child output to every client.
///
/// # Client → Child
/// A posted message is logged as an `rpc` record, serialized as one JSON line and queued on
/// the [`StdinWriter`]. The router never waits for the write; a writer that stopped is fatal
/// for the gateway.
///
/// # Child → Clients
/// Child output is framed into lines. A JSON line is sent to every registered session; a
/// session whose send fails is removed and the others still receive the message. After a
/// successful send of a message carrying an `id`, the session's request record is updated
/// with the response. A non-JSON line is never sent, only logged as a `system` record per
/// session. Error stream output is logged as an `error` record per session.
///
/// Each line is delivered to all sessions before the next line is looked at. Log writes are
/// queued on the [`LogEmitter`] and complete later.
pub struct MessageRouter {
    registry: SessionRegistry,
    framer: LineFramer,
    stdin: StdinWriter,
    emitter: LogEmitter,
}

impl MessageRouter {
    pub fn new(stdin: StdinWriter, emitter: LogEmitter) -> Self {
        Self {
            registry: SessionRegistry::new(),
            framer: LineFramer::new(),
            stdin,
            emitter,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Processes events until every sender is gone.
    ///
    /// Returns an error only for fatal conditions, i.e. when the child's input is no longer
    /// writable.
    pub async fn run(mut self, mut events: mpsc::Receiver<GatewayEvent>) -> Result<(), GatewayError> {
        info!("Router started");
        while let Some(event) = events.recv().await {
            self.handle_event(event)?;
        }
        if self.framer.pending_len() > 0 {
            warn!(
                "Child output ended with {} bytes of an unterminated line",
                self.framer.pending_len()
            );
        }
        info!("Router stopped, no event source left");
        Ok(())
    }

    pub fn handle_event(&mut self, event: GatewayEvent) -> Result<(), GatewayError> {
        match event {
            GatewayEvent::SessionOpened(session) => self.open_session(session),
            GatewayEvent::SessionClosed { session_id, reason } => {
                self.close_session(&session_id, reason)
            }
            GatewayEvent::ClientPost {
                session_id,
                body,
                reply,
            } => match self.accept_client_post(&session_id, &body) {
                Ok(message) => {
                    let _ = reply.send(Ok(()));
                    self.handle_client_message(&session_id, message)?;
                }
                Err(e) => {
                    warn!("[{}] POST rejected: {}", session_id, e);
                    let _ = reply.send(Err(e));
                }
            },
            GatewayEvent::ChildOutput {
                stream: StdioStream::Stdout,
                chunk,
            } => self.handle_stdout_chunk(&chunk),
            GatewayEvent::ChildOutput {
                stream: StdioStream::Stderr,
                chunk,
            } => self.handle_stderr_chunk(&chunk),
        }
        Ok(())
    }

    pub fn open_session(&mut self, session: Session) {
        info!(
            "[{}] session opened from {} (user `{}`)",
            session.id, session.source_addr, session.user_id
        );
        self.registry.add(session);
    }

    /// Removes the session. Unknown identifiers are ignored.
    pub fn close_session(&mut self, session_id: &str, reason: CloseReason) {
        let Some(mut session) = self.registry.remove(session_id) else {
            return;
        };
        session.status = match reason {
            CloseReason::Disconnected => SessionStatus::Closed,
            CloseReason::SendFailed(_) => SessionStatus::Error,
        };
        let duration = Utc::now() - session.connected_at;
        info!(
            "[{}] session ended with status {:?} after {}s: {}",
            session.id,
            session.status,
            duration.num_seconds(),
            reason
        );
    }

    /// Checks that `session_id` is registered and that `body` is a JSON document.
    pub fn accept_client_post(&self, session_id: &str, body: &[u8]) -> Result<Value, SessionError> {
        if !self.registry.contains(session_id) {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        serde_json::from_slice(body).map_err(|e| SessionError::InvalidMessage(e.to_string()))
    }

    /// Logs `message` for the session and queues it for the child.
    pub fn handle_client_message(
        &mut self,
        session_id: &str,
        message: Value,
    ) -> Result<(), GatewayError> {
        match self.registry.get(session_id) {
            Some(session) => self.emitter.insert(LogRecord::rpc(session, &message)),
            None => {
                warn!("[{}] message from unregistered session dropped", session_id);
                return Ok(());
            }
        }
        info!("[{}] Client → Child: {}", session_id, message);
        self.stdin.write_message(&message)?;
        Ok(())
    }

    pub fn handle_stdout_chunk(&mut self, chunk: &[u8]) {
        for line in self.framer.push(chunk) {
            self.route_child_line(&line);
        }
    }

    /// Routes one complete, non-blank line of child output.
    pub fn route_child_line(&mut self, line: &str) {
        match serde_json::from_str::<Value>(line) {
            Ok(message) => self.broadcast(&message),
            Err(_) => {
                for session in self.registry.all() {
                    self.emitter.insert(LogRecord::system(&session, line));
                }
                error!("Child non-JSON: {}", line);
            }
        }
    }

    fn broadcast(&mut self, message: &Value) {
        let rpc_id = rpc_id_of(message);
        let sessions = self.registry.all();
        info!("Child → Clients ({} sessions): {}", sessions.len(), message);

        for session in sessions {
            if !self.registry.contains(&session.id) {
                continue;
            }
            match session.send(message) {
                Ok(()) => {
                    if let Some(rpc_id) = &rpc_id {
                        self.emitter
                            .update(&session.id, rpc_id, LogUpdate::from_response(message));
                    }
                }
                Err(e) => {
                    error!("Failed to send to session {}: {}", session.id, e);
                    self.close_session(&session.id, CloseReason::SendFailed(e.to_string()));
                }
            }
        }
    }

    pub fn handle_stderr_chunk(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        error!("Child stderr: {}", text);
        let sessions = self.registry.all();
        debug!("Recording stderr output for {} session(s)", sessions.len());
        for session in sessions {
            self.emitter.insert(LogRecord::error(&session, &text));
        }
    }
}
