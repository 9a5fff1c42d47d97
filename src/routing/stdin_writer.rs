use log::{debug, error};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error_handling::types::ChildError;

/// Queue of lines for the child's input, written by a dedicated task.
///
/// The router enqueues and moves on; a child that stops reading its input only stalls the
/// writer task. A write failure ends the task with [`ChildError::StdinWriteFailed`], after
/// which every further [`StdinWriter::write_message`] fails with [`ChildError::StdinClosed`].
#[derive(Debug, Clone)]
pub struct StdinWriter {
    queue: mpsc::UnboundedSender<String>,
}

impl StdinWriter {
    pub fn spawn<W>(stdin: W) -> (Self, JoinHandle<Result<(), ChildError>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_lines(stdin, rx));
        (Self { queue: tx }, task)
    }

    /// Serializes `message` as one line and queues it for the child.
    pub fn write_message(&self, message: &Value) -> Result<(), ChildError> {
        let mut line =
            serde_json::to_string(message).map_err(|e| ChildError::SerializeFailed(e.to_string()))?;
        line.push('\n');
        self.queue.send(line).map_err(|_| ChildError::StdinClosed)
    }
}

async fn write_lines<W>(
    mut stdin: W,
    mut queue: mpsc::UnboundedReceiver<String>,
) -> Result<(), ChildError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = queue.recv().await {
        if let Err(e) = write_line(&mut stdin, &line).await {
            error!("Failed to write to the child: {}", e);
            return Err(ChildError::StdinWriteFailed(e));
        }
    }
    debug!("Stdin queue closed");
    Ok(())
}

async fn write_line<W>(stdin: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}
