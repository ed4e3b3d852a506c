//! In-memory transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use pircel_proto::{BoxedStream, Connector};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use super::TestServer;

/// Client end of the pipe. Writes fail with `BrokenPipe` once broken,
/// reads keep working.
struct PipeStream {
    inner: DuplexStream,
    broken: Arc<AtomicBool>,
}

impl AsyncRead for PipeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe broken")));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Hands out one end of a `tokio::io::duplex` pipe on the first connect.
pub struct MockConnector {
    stream: Mutex<Option<DuplexStream>>,
    calls: Mutex<Vec<(String, u16, bool)>>,
    broken: Arc<AtomicBool>,
}

impl MockConnector {
    /// A connector and the scripted server on the other end of its pipe.
    pub fn pair() -> (Arc<Self>, TestServer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let connector = Arc::new(Self {
            stream: Mutex::new(Some(client)),
            calls: Mutex::new(Vec::new()),
            broken: Arc::new(AtomicBool::new(false)),
        });
        (connector, TestServer::new(server))
    }

    /// Every `(host, port, secure)` the client asked for.
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<(String, u16, bool)> {
        self.calls.lock().clone()
    }

    /// Make every later client write fail.
    #[allow(dead_code)]
    pub fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, host: &str, port: u16, secure: bool) -> io::Result<BoxedStream> {
        self.calls.lock().push((host.to_string(), port, secure));
        match self.stream.lock().take() {
            Some(inner) => Ok(Box::new(PipeStream {
                inner,
                broken: Arc::clone(&self.broken),
            })),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock connector already used",
            )),
        }
    }
}
