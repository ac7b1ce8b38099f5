//! Byte source abstraction for telemetry ingestion.
//!
//! The pipeline only needs "give me whatever bytes have arrived". Sources
//! never block for longer than their read timeout, so a stalled device
//! cannot starve the render cadence. Implementations:
//!
//! - [`StreamSource`]: any `AsyncRead` (stdin, TCP serial bridges, pipes)
//! - [`ReplaySource`]: replays a captured or recorded file in fixed chunks
//! - [`ChunkSource`]: pre-loaded chunks, for tests and embedding callers

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use crate::config::defaults::{MAX_READ_BYTES, READ_TIMEOUT_MS, REPLAY_CHUNK_BYTES};

/// Byte source errors. All of these end the current session.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout connecting to {0}")]
    ConnectTimeout(String),

    #[error("Source read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source closed (end of stream)")]
    Closed,
}

/// Trait abstracting where telemetry bytes come from.
///
/// The runner calls [`read_available`](ByteSource::read_available) once per
/// ingestion tick. An empty `Vec` means nothing arrived in time and is not an
/// error. [`SourceError::Closed`] reports end of stream.
#[async_trait]
pub trait ByteSource: Send {
    async fn read_available(&mut self) -> Result<Vec<u8>, SourceError>;

    /// Human-readable name for logging (e.g. "stdin", "tcp://host:port").
    fn source_name(&self) -> &str;
}

#[async_trait]
impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    async fn read_available(&mut self) -> Result<Vec<u8>, SourceError> {
        (**self).read_available().await
    }

    fn source_name(&self) -> &str {
        (**self).source_name()
    }
}

// ============================================================================
// Stream Source (stdin / TCP / any AsyncRead)
// ============================================================================

/// Reads from any async byte stream with a bounded wait.
///
/// The first read of a tick waits up to the read timeout; further reads in
/// the same tick only take what is immediately available, up to
/// `max_read_bytes`.
pub struct StreamSource<R> {
    reader: R,
    name: String,
    read_timeout: Duration,
    max_read_bytes: usize,
    scratch: Box<[u8]>,
    /// Error or EOF seen after bytes were already collected; reported next call
    deferred: Option<SourceError>,
}

impl<R: AsyncRead + Unpin + Send> StreamSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS),
            max_read_bytes: MAX_READ_BYTES,
            scratch: vec![0u8; 8192].into_boxed_slice(),
            deferred: None,
        }
    }

    /// Set the wait for the first read of each tick. Default is 5 ms.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Cap the bytes returned from a single call.
    pub fn with_max_read_bytes(mut self, max: usize) -> Self {
        self.max_read_bytes = max.max(1);
        self
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl StreamSource<tokio::io::Stdin> {
    /// Read raw telemetry piped into the process.
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), "stdin")
    }
}

impl StreamSource<TcpStream> {
    /// Connect to a TCP serial bridge (e.g. ser2net) streaming raw lines.
    pub async fn connect_tcp(addr: &str, connect_timeout: Duration) -> Result<Self, SourceError> {
        tracing::info!(address = %addr, "Connecting to TCP telemetry source");

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SourceError::ConnectTimeout(addr.to_string()))?
            .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?;

        // Detect dead links on an otherwise idle socket
        let sock_ref = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(30))
            .with_interval(Duration::from_secs(10));
        if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
            tracing::warn!(error = %e, "Failed to enable TCP keepalive");
        }
        let _ = stream.set_nodelay(true);

        tracing::info!(address = %addr, "TCP telemetry source connected");
        Ok(Self::new(stream, format!("tcp://{addr}")))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ByteSource for StreamSource<R> {
    async fn read_available(&mut self) -> Result<Vec<u8>, SourceError> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }

        let mut out = Vec::new();
        let mut wait = self.read_timeout;

        while out.len() < self.max_read_bytes {
            let want = (self.max_read_bytes - out.len()).min(self.scratch.len());
            let read = tokio::time::timeout(wait, self.reader.read(&mut self.scratch[..want])).await;

            let err = match read {
                // Nothing more available within the wait
                Err(_) => break,
                Ok(Ok(0)) => SourceError::Closed,
                Ok(Ok(n)) => {
                    out.extend_from_slice(&self.scratch[..n]);
                    wait = Duration::ZERO;
                    continue;
                }
                Ok(Err(e)) => SourceError::Io(e),
            };

            if out.is_empty() {
                return Err(err);
            }
            self.deferred = Some(err);
            break;
        }

        Ok(out)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Raw telemetry piped into the process.
pub type StdinSource = StreamSource<tokio::io::Stdin>;

/// Raw telemetry from a TCP serial bridge.
pub type TcpSource = StreamSource<TcpStream>;

// ============================================================================
// Replay Source (file)
// ============================================================================

/// Replays a file in fixed-size chunks, one chunk per ingestion tick.
///
/// Works with raw device captures and with files written by
/// [`FileSink`](crate::storage::FileSink) when `skip_header` is set.
pub struct ReplaySource {
    inner: StreamSource<tokio::fs::File>,
    skipping_header: bool,
}

impl ReplaySource {
    pub async fn open(path: &Path, chunk_bytes: usize, skip_header: bool) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path).await?;
        let inner = StreamSource::new(file, format!("replay:{}", path.display()))
            .with_max_read_bytes(chunk_bytes);
        tracing::info!(path = %path.display(), chunk_bytes, skip_header, "Replay source opened");
        Ok(Self {
            inner,
            skipping_header: skip_header,
        })
    }

    pub async fn open_default(path: &Path) -> Result<Self, SourceError> {
        Self::open(path, REPLAY_CHUNK_BYTES, false).await
    }
}

#[async_trait]
impl ByteSource for ReplaySource {
    async fn read_available(&mut self) -> Result<Vec<u8>, SourceError> {
        let mut bytes = self.inner.read_available().await?;
        if self.skipping_header {
            match bytes.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    bytes.drain(..=end);
                    self.skipping_header = false;
                }
                None => bytes.clear(),
            }
        }
        Ok(bytes)
    }

    fn source_name(&self) -> &str {
        self.inner.source_name()
    }
}

// ============================================================================
// Chunk Source (pre-loaded)
// ============================================================================

/// Yields pre-loaded chunks one per call, then reports `Closed`.
///
/// An empty chunk models a tick where the device sent nothing.
pub struct ChunkSource {
    chunks: VecDeque<Vec<u8>>,
}

impl ChunkSource {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl ByteSource for ChunkSource {
    async fn read_available(&mut self) -> Result<Vec<u8>, SourceError> {
        self.chunks.pop_front().ok_or(SourceError::Closed)
    }

    fn source_name(&self) -> &str {
        "chunks"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_stream_source_drains_available_bytes() {
        let mock = tokio_test::io::Builder::new()
            .read(b"12.0,1,1,1,")
            .read(b"1,1,1,1,1,0,0\n")
            .build();
        let mut source = StreamSource::new(mock, "mock");

        let bytes = source.read_available().await.unwrap();
        assert_eq!(bytes, b"12.0,1,1,1,1,1,1,1,1,0,0\n");

        assert!(matches!(source.read_available().await, Err(SourceError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_source_times_out_with_empty_read() {
        let mock = tokio_test::io::Builder::new()
            .wait(Duration::from_secs(1))
            .read(b"late\n")
            .build();
        let mut source = StreamSource::new(mock, "mock").with_read_timeout(Duration::from_millis(5));

        let first = source.read_available().await.unwrap();
        assert!(first.is_empty());

        // Eventually the delayed bytes arrive
        let mut got = Vec::new();
        for _ in 0..500 {
            got = source.read_available().await.unwrap();
            if !got.is_empty() {
                break;
            }
        }
        assert_eq!(got, b"late\n");
    }

    #[tokio::test]
    async fn test_stream_source_respects_byte_cap() {
        let mock = tokio_test::io::Builder::new().read(b"abcdef").read(b"gh").build();
        let mut source = StreamSource::new(mock, "mock").with_max_read_bytes(4);

        assert_eq!(source.read_available().await.unwrap(), b"abcd");
        assert_eq!(source.read_available().await.unwrap(), b"efgh");
        assert!(matches!(source.read_available().await, Err(SourceError::Closed)));
    }

    #[tokio::test]
    async fn test_stream_source_defers_error_after_data() {
        let mock = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let mut source = StreamSource::new(mock, "mock");

        assert_eq!(source.read_available().await.unwrap(), b"partial");
        assert!(matches!(source.read_available().await, Err(SourceError::Io(_))));
    }

    #[tokio::test]
    async fn test_replay_source_skips_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Time[ms],Pressure1[kPa]\n1,2,3,4,5,6,7,8,9,10,11\n").unwrap();

        let mut source = ReplaySource::open(file.path(), 1024, true).await.unwrap();
        let bytes = source.read_available().await.unwrap();
        assert_eq!(bytes, b"1,2,3,4,5,6,7,8,9,10,11\n");
        assert!(matches!(source.read_available().await, Err(SourceError::Closed)));
    }

    #[tokio::test]
    async fn test_chunk_source_then_closed() {
        let mut source = ChunkSource::new(vec![b"a".to_vec(), Vec::new()]);
        assert_eq!(source.read_available().await.unwrap(), b"a");
        assert!(source.read_available().await.unwrap().is_empty());
        assert!(matches!(source.read_available().await, Err(SourceError::Closed)));
    }
}
