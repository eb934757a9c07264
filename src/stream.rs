use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadBuf};
use tracing::{debug, warn};

use crate::{
    connection::ConnectionHandle,
    error::{Result, SftpFsError},
    filesystem::{ProgressCallback, Statistics},
    transport::{RemoteReader, RemoteWriter},
};

fn stream_closed() -> SftpFsError {
    SftpFsError::ResourceState("stream closed".into())
}

fn client_not_connected() -> SftpFsError {
    SftpFsError::ResourceState("client not connected".into())
}

async fn release_after_failure(connection: ConnectionHandle) {
    if let Err(err) = connection.disconnect().await {
        warn!("failed to release connection of a dead stream: {err}");
    }
}

/// Sequential reader over a remote file. Owns the connection it reads through and
/// releases it on [`SftpInputStream::close`].
pub struct SftpInputStream {
    inner: BufReader<RemoteReader>,
    connection: Option<ConnectionHandle>,
    statistics: Arc<Statistics>,
    position: u64,
    closed: bool,
}

impl SftpInputStream {
    pub(crate) fn new(
        reader: RemoteReader,
        buffer_size: usize,
        connection: ConnectionHandle,
        statistics: Arc<Statistics>,
    ) -> SftpInputStream {
        SftpInputStream {
            inner: BufReader::with_capacity(buffer_size.max(1), reader),
            connection: Some(connection),
            statistics,
            position: 0,
            closed: false,
        }
    }

    /// Bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek(&mut self, _position: u64) -> Result<()> {
        Err(SftpFsError::Unsupported("seek".into()))
    }

    pub fn seek_to_new_source(&mut self, _position: u64) -> Result<bool> {
        Err(SftpFsError::Unsupported("seek".into()))
    }

    pub fn mark_supported(&self) -> bool {
        false
    }

    pub fn mark(&mut self, _read_limit: usize) {}

    pub fn reset(&mut self) -> Result<()> {
        Err(SftpFsError::Unsupported("mark/reset".into()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes the stream and disconnects its connection. Closing twice is an error.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(stream_closed());
        }
        self.closed = true;

        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        if !connection.is_channel_connected().await {
            release_after_failure(connection).await;
            return Err(client_not_connected());
        }
        debug!(bytes = self.position, "closing input stream");
        connection.disconnect().await
    }
}

impl AsyncRead for SftpInputStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Err(stream_closed().into()));
        }

        let filled_before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let read = (buf.filled().len() - filled_before) as u64;
            if read > 0 {
                self.position += read;
                self.statistics.increment_bytes_read(read);
            }
        }
        result
    }
}

impl Drop for SftpInputStream {
    fn drop(&mut self) {
        if !self.closed {
            warn!(bytes = self.position, "input stream dropped without close");
        }
    }
}

/// Buffered writer to a remote file. Owns the connection it writes through and
/// releases it on [`SftpOutputStream::close`].
pub struct SftpOutputStream {
    inner: BufWriter<RemoteWriter>,
    connection: Option<ConnectionHandle>,
    statistics: Arc<Statistics>,
    progress: Option<ProgressCallback>,
    written: u64,
    closed: bool,
}

impl SftpOutputStream {
    pub(crate) fn new(
        writer: RemoteWriter,
        buffer_size: usize,
        connection: ConnectionHandle,
        statistics: Arc<Statistics>,
        progress: Option<ProgressCallback>,
    ) -> SftpOutputStream {
        SftpOutputStream {
            inner: BufWriter::with_capacity(buffer_size.max(1), writer),
            connection: Some(connection),
            statistics,
            progress,
            written: 0,
            closed: false,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Finishes the transfer, checks the channel is still alive, then disconnects.
    /// Runs once; a second call fails with "stream closed".
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(stream_closed());
        }
        self.closed = true;

        let finished = self.inner.shutdown().await.map_err(|source| SftpFsError::Io {
            context: "cannot finish remote transfer".into(),
            source,
        });

        let Some(connection) = self.connection.take() else {
            return finished;
        };
        if !connection.is_channel_connected().await {
            release_after_failure(connection).await;
            return finished.and(Err(client_not_connected()));
        }
        debug!(bytes = self.written, "closing output stream");
        let disconnected = connection.disconnect().await;
        finished.and(disconnected)
    }
}

impl AsyncWrite for SftpOutputStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.closed {
            return Poll::Ready(Err(stream_closed().into()));
        }

        let result = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = &result {
            let written = *written as u64;
            if written > 0 {
                self.written += written;
                self.statistics.increment_bytes_written(written);
                if let Some(progress) = &self.progress {
                    progress();
                }
            }
        }
        result
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Err(stream_closed().into()));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    /// Only finishes the transfer; the connection is released by `close`.
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Err(stream_closed().into()));
        }
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl Drop for SftpOutputStream {
    fn drop(&mut self) {
        if !self.closed {
            warn!(bytes = self.written, "output stream dropped without close");
        }
    }
}
