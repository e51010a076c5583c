//! In-memory connection for tests and embedding.
//!
//! [`MemoryConnection::pair`] returns the hub-side [`MemoryConnection`] and a
//! [`MemoryPeer`] that plays the remote client:
//!
//! ```text
//! MemoryPeer::send(b"hi")   ──►  MemoryConnection::read()  → 2 bytes
//! MemoryPeer::eof()         ──►  MemoryConnection::read()  → Ok(0)
//! MemoryConnection::write() ──►  MemoryPeer::recv()        → Some(bytes)
//! ```
//!
//! The peer can also make writes fail or hang forever, which is how the
//! broadcaster's isolation and timeout behaviour is exercised.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::connection::{Connection, ConnectionError, ConnectionId};

/// What the next writes to a [`MemoryConnection`] do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Deliver,
    Fail,
    Stall,
}

enum Inbound {
    Data(Bytes),
    Error(ConnectionError),
}

struct Shared {
    closed: CancellationToken,
    write_mode: Mutex<WriteMode>,
    close_calls: AtomicUsize,
}

impl Shared {
    fn write_mode(&self) -> WriteMode {
        *self.write_mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_write_mode(&self, mode: WriteMode) {
        *self.write_mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }
}

struct ReadState {
    rx: mpsc::UnboundedReceiver<Inbound>,
    /// Unread remainder of the last inbound chunk.
    pending: Bytes,
}

/// Hub-side half of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    reader: tokio::sync::Mutex<ReadState>,
    writer: tokio::sync::Mutex<mpsc::UnboundedSender<Bytes>>,
    shared: Arc<Shared>,
}

/// Test-side half of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
}

impl MemoryConnection {
    /// Creates a connected pair with a fresh id and the given remote address.
    pub fn pair(remote_addr: SocketAddr) -> (MemoryConnection, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            closed: CancellationToken::new(),
            write_mode: Mutex::new(WriteMode::Deliver),
            close_calls: AtomicUsize::new(0),
        });

        let conn = MemoryConnection {
            id: ConnectionId::new(),
            remote_addr,
            reader: tokio::sync::Mutex::new(ReadState {
                rx: in_rx,
                pending: Bytes::new(),
            }),
            writer: tokio::sync::Mutex::new(out_tx),
            shared: Arc::clone(&shared),
        };
        let peer = MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
            shared,
        };
        (conn, peer)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        if buf.is_empty() {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "read buffer must not be empty",
            )));
        }
        let mut state = self.reader.lock().await;

        while state.pending.is_empty() {
            let next = tokio::select! {
                _ = self.shared.closed.cancelled() => return Err(ConnectionError::Closed),
                next = state.rx.recv() => next,
            };
            match next {
                Some(Inbound::Data(data)) => state.pending = data,
                Some(Inbound::Error(e)) => return Err(e),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(state.pending.len());
        buf[..n].copy_from_slice(&state.pending[..n]);
        state.pending.advance(n);
        Ok(n)
    }

    async fn write(&self, payload: &[u8]) -> Result<(), ConnectionError> {
        let tx = self.writer.lock().await;
        if self.shared.closed.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        match self.shared.write_mode() {
            WriteMode::Deliver => tx
                .send(Bytes::copy_from_slice(payload))
                .map_err(|_| ConnectionError::Closed),
            WriteMode::Fail => Err(ConnectionError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            ))),
            WriteMode::Stall => {
                // Hold the write lock forever, like a peer that stopped reading.
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.shared.close_calls.fetch_add(1, Ordering::Relaxed);
        if self.shared.closed.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        self.shared.closed.cancel();
        Ok(())
    }
}

impl MemoryPeer {
    /// Queues `data` to be returned by the hub side's next reads.
    ///
    /// Returns `false` if [`eof`](Self::eof) was already called or the hub side
    /// has been dropped.
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(Inbound::Data(data.into())).is_ok(),
            None => false,
        }
    }

    /// Makes the hub side's next read fail with `err`.
    pub fn send_error(&self, err: ConnectionError) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(Inbound::Error(err)).is_ok(),
            None => false,
        }
    }

    /// Ends the inbound stream: once queued data is drained, reads return `Ok(0)`.
    pub fn eof(&mut self) {
        self.inbound = None;
    }

    /// Waits for the next payload written by the hub side.
    ///
    /// Returns `None` once the hub side has been dropped and all writes drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Returns the next written payload if one is already available.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }

    /// Returns every payload written so far.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(b) = self.try_recv() {
            out.push(b);
        }
        out
    }

    /// Makes every subsequent write fail with a broken-pipe I/O error.
    pub fn fail_writes(&self) {
        self.shared.set_write_mode(WriteMode::Fail);
    }

    /// Makes every subsequent write hang forever.
    pub fn stall_writes(&self) {
        self.shared.set_write_mode(WriteMode::Stall);
    }

    /// Returns `true` once the hub side has called `close()`.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// How many times the hub side called `close()`.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::Relaxed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (MemoryConnection, MemoryPeer) {
        MemoryConnection::pair("192.168.1.20:6000".parse().unwrap())
    }

    #[tokio::test]
    async fn test_read_returns_sent_bytes() {
        let (conn, peer) = pair();
        peer.send("hello");

        let mut buf = [0u8; 16];
        let n = conn.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn test_read_splits_chunk_larger_than_buffer() {
        let (conn, peer) = pair();
        peer.send("abcdef");

        let mut buf = [0u8; 4];
        let n1 = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n1], b"abcd");
        let n2 = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n2], b"ef");
    }

    #[tokio::test]
    async fn test_read_returns_zero_after_eof() {
        let (conn, mut peer) = pair();
        peer.send("x");
        peer.eof();

        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&mut buf).await.unwrap(), 1);
        assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_buffer_read_is_invalid_input() {
        // Ok(0) would read as EOF and end the session
        let (conn, peer) = pair();
        peer.send("queued");

        let result = conn.read(&mut []).await;

        assert!(matches!(
            result,
            Err(ConnectionError::Io(ref e)) if e.kind() == std::io::ErrorKind::InvalidInput
        ));
        let mut buf = [0u8; 16];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"queued");
    }

    #[tokio::test]
    async fn test_read_returns_injected_error() {
        let (conn, peer) = pair();
        peer.send_error(ConnectionError::Protocol("garbage".to_string()));

        let mut buf = [0u8; 4];
        let result = conn.read(&mut buf).await;

        assert!(matches!(result, Err(ConnectionError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_pending_read_is_woken_by_local_close() {
        let (conn, _peer) = pair();
        let conn = Arc::new(conn);

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                conn.read(&mut buf).await
            })
        };
        tokio::task::yield_now().await;
        conn.close().await.unwrap();

        let result = reader.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_write_is_received_by_peer() {
        let (conn, mut peer) = pair();
        conn.write(b"payload").await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_fail_writes_makes_write_error() {
        let (conn, peer) = pair();
        peer.fail_writes();
        let result = conn.write(b"x").await;
        assert!(matches!(result, Err(ConnectionError::Io(_))));
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (conn, peer) = pair();
        conn.close().await.unwrap();
        assert!(peer.is_closed());
        assert!(matches!(conn.write(b"x").await, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_second_close_reports_closed() {
        let (conn, peer) = pair();
        assert!(conn.close().await.is_ok());
        assert!(matches!(conn.close().await, Err(ConnectionError::Closed)));
        assert_eq!(peer.close_calls(), 2);
    }
}
