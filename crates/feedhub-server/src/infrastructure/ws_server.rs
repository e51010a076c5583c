//! WebSocket server: accept loop, upgrade routing and hand-off to the hub.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Upgrading each connection to a WebSocket, choosing the endpoint from the
//!    request path (`/chat` or `/live-feed` by default).  Any other path gets
//!    an HTTP 404 and never becomes a connection.
//! 4. Wrapping the upgraded stream in a [`WsConnection`] and passing it to
//!    [`Hub::serve`], which runs the read loop or the live feed.
//! 5. Stopping the accept loop when the hub's shutdown token is cancelled.
//!
//! # Scalability
//!
//! The accept loop never performs a handshake itself: every accepted socket
//! is handed to its own task via [`Hub::spawn`], so a slow or malicious client
//! stalls only its own upgrade, and only until `handshake_timeout` or
//! shutdown, whichever comes first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use feedhub_core::{Connection, Endpoint, Hub};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::domain::config::ServerConfig;
use crate::infrastructure::ws_connection::WsConnection;

/// Pause after a failed `accept()` so a persistent error (e.g. out of file
/// descriptors) does not turn the loop into a busy spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the WebSocket listener.
///
/// # Errors
///
/// Returns an error if the address is in use or the process lacks permission
/// to bind it.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))
}

/// Binds `config.bind_addr` and serves until the hub shuts down.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: ServerConfig, hub: Arc<Hub>) -> anyhow::Result<()> {
    let listener = bind(config.bind_addr).await?;
    serve(listener, hub, Arc::new(config)).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Returns once [`Hub::shutdown`] has been called.  Connections that are
/// mid-handshake at that moment are dropped; their tasks run on the hub's
/// tracker, so [`Hub::wait`] also waits for them.
///
/// # Errors
///
/// Currently infallible after binding; accept errors are logged and the
/// loop continues.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<Hub>,
    config: Arc<ServerConfig>,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        "feedhub listening on ws://{local_addr} (chat: {}, live feed: {})",
        config.chat_path, config.live_feed_path
    );

    let cancel = hub.shutdown_token();
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested; stopping accept loop");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                debug!(peer = %peer_addr, "TCP connection accepted");
                let session_hub = Arc::clone(&hub);
                let cfg = Arc::clone(&config);
                hub.spawn(async move {
                    handle_ws_session(stream, peer_addr, session_hub, cfg).await;
                });
            }
            Err(e) => {
                error!("accept error: {e}");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Top-level handler for one accepted socket: wraps [`upgrade_and_serve`]
/// and logs the outcome.
async fn handle_ws_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<Hub>,
    config: Arc<ServerConfig>,
) {
    if let Err(e) = upgrade_and_serve(stream, peer_addr, &hub, &config).await {
        warn!(peer = %peer_addr, "connection not established: {e:#}");
    }
}

/// Performs the WebSocket upgrade and hands the connection to the hub.
///
/// Returns as soon as the hub has taken over; the connection itself keeps
/// running on the hub's task.
///
/// # Errors
///
/// Returns an error if the handshake fails or times out.  An unknown request
/// path is not an error: the client receives a 404 and `Ok(())` is returned.
async fn upgrade_and_serve(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: &Hub,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    let mut route: Option<Endpoint> = None;
    let mut rejected_path: Option<String> = None;

    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let path = req.uri().path();
        match config.endpoint_for_path(path) {
            Some(endpoint) => {
                route = Some(endpoint);
                Ok(resp)
            }
            None => {
                rejected_path = Some(path.to_string());
                Err(not_found())
            }
        }
    };

    let cancel = hub.shutdown_token();
    let handshake = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(peer = %peer_addr, "shutdown during handshake");
            return Ok(());
        }
        result = timeout(config.handshake_timeout, accept_hdr_async(stream, callback)) => result,
    };

    let ws = match handshake {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            if let Some(path) = rejected_path {
                info!(peer = %peer_addr, %path, "rejected upgrade for unknown path");
                return Ok(());
            }
            return Err(e).with_context(|| format!("WebSocket handshake failed with {peer_addr}"));
        }
        Err(_) => anyhow::bail!(
            "WebSocket handshake with {peer_addr} timed out after {:?}",
            config.handshake_timeout
        ),
    };

    let endpoint = route.context("handshake accepted without a route")?;
    let conn: Arc<dyn Connection> = Arc::new(WsConnection::new(ws, peer_addr));
    info!(conn = %conn.id(), peer = %peer_addr, %endpoint, "WebSocket connection established");
    hub.serve(conn, endpoint);
    Ok(())
}

/// The handshake response for a path that is neither chat nor live feed.
fn not_found() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("unknown endpoint".to_string()));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_response_is_404() {
        let resp = not_found();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body().as_deref(), Some("unknown endpoint"));
    }

    #[tokio::test]
    async fn test_bind_reports_address_in_use() {
        // Arrange: occupy a port
        let first = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let taken = first.local_addr().unwrap();

        // Act
        let second = bind(taken).await;

        // Assert
        let err = second.unwrap_err();
        assert!(format!("{err:#}").contains(&taken.to_string()));
    }

    #[tokio::test]
    async fn test_serve_returns_after_hub_shutdown() {
        // Arrange
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let hub = Arc::new(Hub::default());
        let server = tokio::spawn(serve(
            listener,
            Arc::clone(&hub),
            Arc::new(ServerConfig::default()),
        ));

        // Act
        hub.shutdown();

        // Assert
        let result = timeout(Duration::from_secs(2), server).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_hub_wait_covers_pending_handshakes() {
        // Arrange: a client that connects but never sends the upgrade request
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Arc::new(Hub::default());
        let config = ServerConfig {
            handshake_timeout: Duration::from_secs(60),
            ..ServerConfig::default()
        };
        tokio::spawn(serve(listener, Arc::clone(&hub), Arc::new(config)));
        let _silent = TcpStream::connect(addr).await.unwrap();
        timeout(Duration::from_secs(2), async {
            while hub.active_tasks() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("handshake task is tracked by the hub");

        // Act
        hub.shutdown();

        // Assert
        timeout(Duration::from_secs(2), hub.wait())
            .await
            .expect("pending handshake ends on shutdown");
        assert_eq!(hub.active_tasks(), 0);
    }
}
