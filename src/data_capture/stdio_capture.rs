use log::{debug, error, trace};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::StdioStream;
use crate::routing::GatewayEvent;

const CHUNK_SIZE: usize = 8 * 1024;
const PREVIEW_LEN: usize = 64;

/// Pumps the child's output pipes into the router's event channel.
///
/// Each pipe gets its own task. Chunks are forwarded as read, without framing, so the order
/// of bytes within one stream is preserved; framing happens in the router.
pub struct StdioCapture;

impl StdioCapture {
    /// Spawns a task forwarding `reader` as [`GatewayEvent::ChildOutput`] chunks tagged with
    /// `stream`. The task ends on EOF, on a read error, or when the router is gone.
    pub fn spawn<R>(
        stream: StdioStream,
        reader: R,
        events: mpsc::Sender<GatewayEvent>,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(Self::pump(stream, reader, events))
    }

    async fn pump<R>(stream: StdioStream, mut reader: R, events: mpsc::Sender<GatewayEvent>)
    where
        R: AsyncRead + Unpin,
    {
        debug!("[child:{:?}] capture started", stream);
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("[child:{:?}] EOF", stream);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    error!("[child:{:?}] read failed: {}", stream, e);
                    break;
                }
            };

            let preview = &buf[..std::cmp::min(n, PREVIEW_LEN)];
            trace!(
                "[child:{:?}] captured {} bytes: {}{}",
                stream,
                n,
                String::from_utf8_lossy(preview),
                if n > PREVIEW_LEN { " ..." } else { "" }
            );

            let event = GatewayEvent::ChildOutput {
                stream,
                chunk: buf[..n].to_vec(),
            };
            if events.send(event).await.is_err() {
                debug!("[child:{:?}] router gone, capture stopped", stream);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn forwards_chunks_in_order_until_eof() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(16);
        let task = StdioCapture::spawn(StdioStream::Stdout, reader, tx);

        writer.write_all(b"first\nsec").await.unwrap();
        writer.flush().await.unwrap();
        writer.write_all(b"ond\n").await.unwrap();
        drop(writer);
        task.await.unwrap();

        let mut collected = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                GatewayEvent::ChildOutput { stream, chunk } => {
                    assert_eq!(stream, StdioStream::Stdout);
                    collected.extend(chunk);
                }
                _ => panic!("unexpected event"),
            }
        }
        assert_eq!(collected, b"first\nsecond\n");
    }

    #[tokio::test]
    async fn stops_when_router_is_gone() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let task = StdioCapture::spawn(StdioStream::Stderr, reader, tx);

        writer.write_all(b"boom").await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("capture task did not stop")
            .unwrap();
    }
}
