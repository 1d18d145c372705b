//! Frame transport: newline-delimited JSON text over any byte stream.
//!
//! The session only sees `FrameSink` / `FrameSource`; a TCP implementation and
//! an in-memory pair (for tests and local loopback) are provided here.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

use crate::error::{Result, SessionError};

/// Longest line accepted from the wire, newline included.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame. `line` must not contain a newline.
    async fn send_line(&mut self, line: &str) -> Result<()>;
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next frame without its trailing newline; `None` once the peer closes.
    async fn next_line(&mut self) -> Result<Option<String>>;
}

// ── TCP ──────────────────────────────────────────────────────────────────────

pub struct TcpFrameSink {
    writer: OwnedWriteHalf,
}

pub struct TcpFrameSource {
    reader: BufReader<OwnedReadHalf>,
    line: String,
}

pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<(TcpFrameSink, TcpFrameSource)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(split_tcp(stream))
}

pub fn split_tcp(stream: TcpStream) -> (TcpFrameSink, TcpFrameSource) {
    let (read_half, writer) = stream.into_split();
    (
        TcpFrameSink { writer },
        TcpFrameSource {
            reader: BufReader::new(read_half),
            line: String::new(),
        },
    )
}

#[async_trait]
impl FrameSink for TcpFrameSink {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        if line.contains('\n') {
            return Err(SessionError::Transport("frame contains a newline".into()));
        }
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSource for TcpFrameSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            self.line.clear();
            let n = (&mut self.reader)
                .take(MAX_FRAME_LEN as u64)
                .read_line(&mut self.line)
                .await?;
            if n == 0 {
                return Ok(None);
            }
            if !self.line.ends_with('\n') && n == MAX_FRAME_LEN {
                return Err(SessionError::Transport(format!(
                    "frame exceeds {MAX_FRAME_LEN} bytes"
                )));
            }
            let frame = self.line.trim_end_matches(['\r', '\n']);
            if !frame.is_empty() {
                return Ok(Some(frame.to_string()));
            }
        }
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

pub struct MemoryFrameSink {
    tx: mpsc::UnboundedSender<String>,
}

pub struct MemoryFrameSource {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Connected sink/source pair: lines sent on the sink come out of the source.
pub fn memory_pipe() -> (MemoryFrameSink, MemoryFrameSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryFrameSink { tx }, MemoryFrameSource { rx })
}

#[async_trait]
impl FrameSink for MemoryFrameSink {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.tx
            .send(line.to_string())
            .map_err(|_| SessionError::Transport("memory pipe closed".into()))
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

impl MemoryFrameSource {
    /// Non-blocking receive, for draining in tests.
    pub fn try_next_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_lines_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut sink, mut source) = split_tcp(stream);
            while let Some(line) = source.next_line().await.unwrap() {
                sink.send_line(&format!("echo:{line}")).await.unwrap();
            }
        });

        let (mut sink, mut source) = connect_tcp(addr).await.unwrap();
        sink.send_line(r#"{"type":"client_list_request"}"#).await.unwrap();
        sink.send_line("second").await.unwrap();
        assert_eq!(
            source.next_line().await.unwrap().as_deref(),
            Some(r#"echo:{"type":"client_list_request"}"#)
        );
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("echo:second"));

        drop(sink);
        assert_eq!(source.next_line().await.unwrap(), None);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_sink_refuses_embedded_newlines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let (mut sink, _source) = connect_tcp(addr).await.unwrap();
        assert!(matches!(
            sink.send_line("a\nb").await,
            Err(SessionError::Transport(_))
        ));
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn memory_pipe_delivers_in_order() {
        let (mut sink, mut source) = memory_pipe();
        sink.send_line("one").await.unwrap();
        sink.send_line("two").await.unwrap();
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("one"));
        assert_eq!(source.try_next_line().as_deref(), Some("two"));
        drop(sink);
        assert_eq!(source.next_line().await.unwrap(), None);
    }
}
