//! `WsConnection`: a tokio-tungstenite WebSocket seen through the hub's
//! [`Connection`] trait.
//!
//! # Frames vs. bytes (for beginners)
//!
//! WebSocket is message-oriented: the peer sends whole frames.  The hub reads
//! like a byte stream into a fixed buffer.  The adapter bridges the two:
//!
//! ```text
//! frame "hello world" (11 bytes), buffer of 4 bytes
//!   read() → "hell"
//!   read() → "o wo"
//!   read() → "rld"      (frame exhausted, next read pulls the next frame)
//! ```
//!
//! Control frames (ping/pong) and empty frames never surface as data.  A close
//! frame, an ended stream, or a peer that vanished without a closing
//! handshake is reported as EOF (`Ok(0)`).  Once [`Connection::close`] has
//! been called, pending and future reads fail with `ConnectionError::Closed`.
//!
//! On the way out, a payload that is valid UTF-8 goes out as a text frame
//! (what browsers expect from a chat server), anything else as binary.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use feedhub_core::{Connection, ConnectionError, ConnectionId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long [`WsConnection::close`] waits for the close frame to be flushed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

struct ReadState<S> {
    stream: SplitStream<WebSocketStream<S>>,
    /// Unread remainder of the current data frame.
    pending: Bytes,
}

/// A WebSocket peer.
pub struct WsConnection<S> {
    id: ConnectionId,
    remote_addr: SocketAddr,
    reader: tokio::sync::Mutex<ReadState<S>>,
    // Serializes writes: at most one frame in flight per connection.
    sink: tokio::sync::Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    closed: AtomicBool,
    /// Cancelled by `close()`; wakes a read blocked on the next frame.
    closing: CancellationToken,
}

impl<S> WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an upgraded WebSocket stream and assigns it a fresh id.
    pub fn new(ws: WebSocketStream<S>, remote_addr: SocketAddr) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: ConnectionId::new(),
            remote_addr,
            reader: tokio::sync::Mutex::new(ReadState {
                stream,
                pending: Bytes::new(),
            }),
            sink: tokio::sync::Mutex::new(sink),
            closed: AtomicBool::new(false),
            closing: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
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

        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }

        let mut state = self.reader.lock().await;
        loop {
            if self.closing.is_cancelled() {
                return Err(ConnectionError::Closed);
            }
            if !state.pending.is_empty() {
                let n = buf.len().min(state.pending.len());
                buf[..n].copy_from_slice(&state.pending[..n]);
                state.pending.advance(n);
                return Ok(n);
            }

            let next = tokio::select! {
                biased;
                _ = self.closing.cancelled() => return Err(ConnectionError::Closed),
                next = state.stream.next() => next,
            };
            match next {
                Some(Ok(WsMessage::Text(text))) => state.pending = Bytes::from(text),
                Some(Ok(WsMessage::Binary(data))) => state.pending = Bytes::from(data),
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(conn = %self.id, ?frame, "close frame received");
                    return Ok(0);
                }
                None => return Ok(0),
                Some(Err(e)) if is_peer_gone(&e) => {
                    debug!(conn = %self.id, "peer went away: {e}");
                    return Ok(0);
                }
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }

    async fn write(&self, payload: &[u8]) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }
        let frame = match std::str::from_utf8(payload) {
            Ok(text) => WsMessage::Text(text.to_owned()),
            Err(_) => WsMessage::Binary(payload.to_vec()),
        };
        let mut sink = self.sink.lock().await;
        sink.send(frame).await.map_err(map_ws_error)
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ConnectionError::Closed);
        }
        self.closing.cancel();
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if is_peer_gone(&e) => Ok(()),
            Ok(Err(e)) => Err(map_ws_error(e)),
            Err(_) => Err(ConnectionError::TimedOut(CLOSE_TIMEOUT)),
        }
    }
}

/// The peer is no longer there, with or without a closing handshake.
fn is_peer_gone(e: &WsError) -> bool {
    matches!(
        e,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

fn map_ws_error(e: WsError) -> ConnectionError {
    match e {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::SendAfterClosing) => ConnectionError::Closed,
        WsError::Io(io) => ConnectionError::Io(io),
        other => ConnectionError::Protocol(other.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
