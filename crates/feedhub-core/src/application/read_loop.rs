//! Read Loop: the per-connection task behind the chat endpoint.
//!
//! # State machine
//!
//! ```text
//!            ┌──── read n > 0 → publish ────┐
//!            ▼                              │
//!   start ─► OPEN ──────────────────────────┘
//!            │
//!            ├── read Ok(0) (peer EOF) ───────────► CLOSED (PeerClosed)
//!            ├── read error (non-transient) ──────► CLOSED (ReadFailed)
//!            ├── too many transient errors ───────► CLOSED (ReadFailed)
//!            └── cancellation token fired ────────► CLOSED (Cancelled)
//! ```
//!
//! On entry the connection is added to the registry; on every exit path it is
//! removed and closed.  Messages read from one connection are published one
//! at a time, so they reach every recipient in read order.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::broadcaster::Broadcaster;
use crate::domain::connection::{Connection, ConnectionError};
use crate::domain::message::Message;

/// Why a read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLoopExit {
    /// The peer closed the connection (EOF).
    PeerClosed,
    /// A read failed with an unrecoverable error.
    ReadFailed,
    /// Hub shutdown was requested.
    Cancelled,
}

/// Tuning knobs for [`run_read_loop`].
#[derive(Debug, Clone, Copy)]
pub struct ReadLoopOptions {
    /// Size of the per-connection read buffer; longer frames arrive as
    /// several messages.
    pub buffer_size: usize,
    /// How many transient read errors in a row are retried before the
    /// connection is treated as dead.  `0` makes every read error terminal.
    pub max_transient_retries: u32,
}

impl Default for ReadLoopOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            max_transient_retries: 3,
        }
    }
}

/// Runs the chat read loop for `conn` until EOF, error, or cancellation.
pub async fn run_read_loop(
    conn: Arc<dyn Connection>,
    broadcaster: Broadcaster,
    options: ReadLoopOptions,
    cancel: CancellationToken,
) -> ReadLoopExit {
    let id = conn.id();
    let peer = conn.remote_addr();
    let registry = Arc::clone(broadcaster.registry());

    registry.add(Arc::clone(&conn));
    info!(conn = %id, peer = %peer, "chat connection registered");

    let mut buf = vec![0u8; options.buffer_size.max(1)];
    let mut transient_errors = 0u32;

    let exit = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break ReadLoopExit::Cancelled,
            read = conn.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!(conn = %id, peer = %peer, "peer closed the connection");
                break ReadLoopExit::PeerClosed;
            }
            Ok(n) => {
                transient_errors = 0;
                let message = Message::from_peer(id, peer, buf[..n].to_vec());
                broadcaster.publish(message).await;
            }
            Err(e) if e.is_transient() && transient_errors < options.max_transient_retries => {
                transient_errors += 1;
                debug!(conn = %id, attempt = transient_errors, "transient read error, retrying: {e}");
                tokio::task::yield_now().await;
            }
            Err(ConnectionError::Closed) => {
                debug!(conn = %id, peer = %peer, "connection closed underneath the read loop");
                break ReadLoopExit::PeerClosed;
            }
            Err(e) => {
                warn!(conn = %id, peer = %peer, "read failed, dropping connection: {e}");
                break ReadLoopExit::ReadFailed;
            }
        }
    };

    registry.remove(id);
    if let Err(e) = conn.close().await {
        debug!(conn = %id, "close after read loop: {e}");
    }
    info!(conn = %id, peer = %peer, reason = ?exit, "chat connection finished");
    exit
}

// ── Tests ─────────────────────────────────────────────────────────────────────
