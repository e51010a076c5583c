//! The `Connection` trait: the hub's only view of a peer.
//!
//! The hub never touches sockets or WebSocket frames directly.  Whatever
//! transport accepted the peer hands the hub an `Arc<dyn Connection>`, and the
//! hub reads, writes and closes through this trait.
//!
//! # Read semantics
//!
//! [`Connection::read`] mirrors a classic stream read: it fills at most
//! `buf.len()` bytes and returns how many were written.  A return value of
//! `Ok(0)` means the peer closed the connection (EOF).  Implementations must
//! never return `Ok(0)` for any other reason.
//!
//! # Sharing
//!
//! All methods take `&self` so one `Arc<dyn Connection>` can be held by the
//! registry, the read loop and any number of in-flight broadcast tasks at the
//! same time.  Implementations serialize their own writes: at most one write
//! is in flight per connection.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identity of one accepted connection.
///
/// A reconnecting peer gets a new id; ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Errors reported by a [`Connection`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection was already closed locally or by the peer.
    #[error("connection closed")]
    Closed,

    /// The underlying byte stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport rejected a frame or saw a framing violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A write did not complete within the configured bound.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
}

impl ConnectionError {
    /// Returns `true` for errors worth retrying on the same connection.
    ///
    /// Only interrupted or would-block style I/O failures qualify.  Everything
    /// else means the connection is unusable.
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectionError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// A handle to one peer's byte stream.
///
/// Provided by the transport; referenced, never owned, by the hub.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identity of this connection, stable for its whole lifetime.
    fn id(&self) -> ConnectionId;

    /// Address of the remote peer.
    fn remote_addr(&self) -> SocketAddr;

    /// Reads inbound bytes into `buf`.  `Ok(0)` means end of stream.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, ConnectionError>;

    /// Writes one complete payload to the peer.
    async fn write(&self, payload: &[u8]) -> Result<(), ConnectionError>;

    /// Closes the connection.  Closing twice yields [`ConnectionError::Closed`].
    async fn close(&self) -> Result<(), ConnectionError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
