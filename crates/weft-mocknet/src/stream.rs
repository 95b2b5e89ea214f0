//! Protocol-tagged duplex byte streams.
//!
//! A stream is created as a mirrored pair: the opener keeps one half, the
//! remote peer's handler receives the other. Bytes written on one half are
//! readable, in order, on the other. The two halves ride on a bounded
//! in-memory pipe, so writes exert backpressure instead of buffering
//! without limit.
//!
//! Close semantics:
//! - `close()` is idempotent. It ends the stream for writing on both
//!   sides; the remote drains whatever is in flight and then reads
//!   end-of-data (`Ok(0)`).
//! - Forced teardown (connection close or scope shutdown) fails blocked
//!   reads and writes on both halves instead of letting them hang.
//!
//! The halves implement [`AsyncRead`] and [`AsyncWrite`], so protocol code
//! written against the standard I/O traits runs unmodified against a real
//! transport or this mock.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream as _;

use weft_types::ProtocolId;

use crate::conn::ConnShared;
use crate::error::MocknetError;

/// Bound of the in-memory pipe buffer; writes past it wait for the remote
/// side to consume.
const STREAM_BUF_SIZE: usize = 64 * 1024;

/// State shared by the two halves of one mirrored stream pair.
#[derive(Debug)]
pub(crate) struct StreamShared {
    reset_tx: watch::Sender<bool>,
}

impl StreamShared {
    pub(crate) fn new() -> Arc<Self> {
        let (reset_tx, _reset_rx) = watch::channel(false);
        Arc::new(Self { reset_tx })
    }

    /// Force both halves closed. Blocked reads and writes wake with an
    /// error rather than hanging.
    pub(crate) fn reset(&self) {
        let _ = self.reset_tx.send(true);
    }

    fn subscribe(&self) -> WatchStream<bool> {
        WatchStream::new(self.reset_tx.subscribe())
    }
}

/// Removes the pair from its connection's stream table once the last half
/// is gone.
#[derive(Debug)]
pub(crate) struct StreamRegistration {
    conn: Weak<ConnShared>,
    id: u64,
}

impl StreamRegistration {
    pub(crate) fn new(conn: Weak<ConnShared>, id: u64) -> Arc<Self> {
        Arc::new(Self { conn, id })
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Arc<Self> {
        Arc::new(Self {
            conn: Weak::new(),
            id: 0,
        })
    }
}

impl Drop for StreamRegistration {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.upgrade() {
            conn.deregister(self.id);
        }
    }
}

/// Build the mirrored halves for a freshly opened stream.
pub(crate) fn pair(
    protocol: ProtocolId,
    shared: Arc<StreamShared>,
    registration: Arc<StreamRegistration>,
) -> (Stream, Stream) {
    let (a, b) = tokio::io::duplex(STREAM_BUF_SIZE);
    (
        Stream::new(protocol.clone(), a, shared.clone(), registration.clone()),
        Stream::new(protocol, b, shared, registration),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HalfState {
    Open,
    /// This half closed gracefully.
    Closed,
    /// The pair was force-closed by conn or scope teardown.
    Reset,
}

/// One half of an ordered, reliable, protocol-tagged duplex byte channel.
pub struct Stream {
    protocol: ProtocolId,
    pipe: Option<DuplexStream>,
    state: HalfState,
    reset_rx: WatchStream<bool>,
    _shared: Arc<StreamShared>,
    _registration: Arc<StreamRegistration>,
}

impl Stream {
    fn new(
        protocol: ProtocolId,
        pipe: DuplexStream,
        shared: Arc<StreamShared>,
        registration: Arc<StreamRegistration>,
    ) -> Self {
        let reset_rx = shared.subscribe();
        Self {
            protocol,
            pipe: Some(pipe),
            state: HalfState::Open,
            reset_rx,
            _shared: shared,
            _registration: registration,
        }
    }

    /// Protocol this stream was opened for.
    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }

    /// Close this half. Idempotent.
    ///
    /// Any bytes already written stay readable on the remote half, after
    /// which its reads observe end-of-data. Writes fail on both halves
    /// from this point on.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.pipe.is_none() {
            return Ok(());
        }
        self.shutdown().await
    }

    /// Poll the forced-close channel, keeping this task registered for a
    /// teardown wakeup. Returns true once the pair has been reset.
    fn poll_reset(&mut self, cx: &mut Context<'_>) -> bool {
        if self.state == HalfState::Reset {
            return true;
        }
        loop {
            match Pin::new(&mut self.reset_rx).poll_next(cx) {
                Poll::Ready(Some(true)) => {
                    self.state = HalfState::Reset;
                    self.pipe = None;
                    return true;
                }
                Poll::Ready(Some(false)) => continue,
                Poll::Ready(None) | Poll::Pending => return false,
            }
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, MocknetError::StreamClosed)
}

fn reset_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, MocknetError::StreamClosed)
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_reset(cx) {
            return Poll::Ready(Err(reset_error()));
        }
        match this.pipe.as_mut() {
            Some(pipe) => Pin::new(pipe).poll_read(cx, buf),
            None => Poll::Ready(Err(closed_error())),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.poll_reset(cx) {
            return Poll::Ready(Err(reset_error()));
        }
        let Some(pipe) = this.pipe.as_mut() else {
            return Poll::Ready(Err(closed_error()));
        };
        match Pin::new(pipe).poll_write(cx, buf) {
            // The pipe reports a dropped or shut-down remote half as
            // BrokenPipe; surface it as the typed stream-closed error.
            Poll::Ready(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {
                Poll::Ready(Err(closed_error()))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_reset(cx) {
            return Poll::Ready(Err(reset_error()));
        }
        match this.pipe.as_mut() {
            Some(pipe) => Pin::new(pipe).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(pipe) = this.pipe.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        match Pin::new(pipe).poll_shutdown(cx) {
            Poll::Ready(res) => {
                // Dropping our end finishes the job: remote writes now
                // fail, remote reads drain and then see end-of-data.
                this.state = HalfState::Closed;
                this.pipe = None;
                Poll::Ready(res)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("protocol", &self.protocol)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn test_pair() -> (Stream, Stream) {
        pair(
            ProtocolId::from("/weft/test/1"),
            StreamShared::new(),
            StreamRegistration::detached(),
        )
    }

    #[tokio::test]
    async fn test_round_trip_then_eof() {
        let (mut local, mut remote) = test_pair();

        local.write_all(b"beep").await.unwrap();
        local.close().await.unwrap();

        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"beep");

        // Orderly completion, not an error.
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_write_after_local_close_fails() {
        let (mut local, _remote) = test_pair();
        local.close().await.unwrap();
        let err = local.write_all(b"beep").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_write_after_remote_close_fails() {
        let (mut local, mut remote) = test_pair();
        remote.close().await.unwrap();
        let err = local.write_all(b"beep").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut local, _remote) = test_pair();
        local.close().await.unwrap();
        local.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_drop_behaves_as_close() {
        let (mut local, remote) = test_pair();
        drop(remote);
        let err = local.write_all(b"beep").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_reset_unblocks_blocked_read() {
        let shared = StreamShared::new();
        let (mut local, _remote) = pair(
            ProtocolId::from("/weft/test/1"),
            shared.clone(),
            StreamRegistration::detached(),
        );

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            local.read_exact(&mut buf).await
        });

        // Let the reader park on the empty pipe before tearing down.
        tokio::task::yield_now().await;
        shared.reset();

        let err = reader.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_reset_fails_writes_on_both_halves() {
        let shared = StreamShared::new();
        let (mut local, mut remote) = pair(
            ProtocolId::from("/weft/test/1"),
            shared.clone(),
            StreamRegistration::detached(),
        );

        shared.reset();

        assert!(local.write_all(b"x").await.is_err());
        assert!(remote.write_all(b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_read_after_local_close_fails() {
        let (mut local, _remote) = test_pair();
        local.close().await.unwrap();
        let mut buf = [0u8; 1];
        let err = local.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_backpressured_write_completes_when_drained() {
        let (mut local, mut remote) = test_pair();

        // More than the pipe bound, so the writer has to wait for the
        // reader to make room.
        let payload = vec![0xabu8; STREAM_BUF_SIZE * 2];
        let to_send = payload.clone();
        let writer = tokio::spawn(async move {
            local.write_all(&to_send).await.unwrap();
            local.close().await.unwrap();
        });

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        writer.await.unwrap();
        assert_eq!(received, payload);
    }
}
