//! End-to-end tests: real WebSocket clients against a bound server.
//!
//! Each test binds `127.0.0.1:0`, runs the accept loop on a background task,
//! and talks to it with `tokio_tungstenite::connect_async`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use feedhub_core::Hub;
use feedhub_server::domain::ServerConfig;
use feedhub_server::infrastructure::{bind, serve};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    hub: Arc<Hub>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Arc::new(Hub::new(config.hub_config()));
        tokio::spawn(serve(listener, Arc::clone(&hub), Arc::new(config)));
        Self { addr, hub }
    }

    async fn connect(&self, path: &str) -> Client {
        let (ws, _) = connect_async(format!("ws://{}{}", self.addr, path))
            .await
            .unwrap();
        ws
    }

    /// Waits until `n` chat connections are registered.
    async fn wait_for_chat_peers(&self, n: usize) {
        timeout(Duration::from_secs(5), async {
            while self.hub.registry().len() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {n} connections"));
    }

    async fn stop(self) {
        self.hub.shutdown();
        let _ = timeout(Duration::from_secs(5), self.hub.wait()).await;
    }
}

/// Next data frame as text, skipping control frames.
async fn next_text(client: &mut Client, limit: Duration) -> Option<String> {
    timeout(limit, async {
        while let Some(frame) = client.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => return Some(text),
                Ok(WsMessage::Binary(data)) => return Some(String::from_utf8_lossy(&data).into()),
                Ok(WsMessage::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test]
async fn test_chat_message_reaches_other_clients_only() {
    // Arrange
    let server = TestServer::start(ServerConfig::default()).await;
    let mut a = server.connect("/chat").await;
    let mut b = server.connect("/chat").await;
    let mut c = server.connect("/chat").await;
    server.wait_for_chat_peers(3).await;

    // Act
    a.send(WsMessage::Text("hello".into())).await.unwrap();

    // Assert
    for client in [&mut b, &mut c] {
        let text = next_text(client, Duration::from_secs(5)).await.unwrap();
        assert!(text.starts_with("user 127.0.0.1:"), "got {text:?}");
        assert!(text.ends_with(" wrote: hello"), "got {text:?}");
    }
    assert_eq!(next_text(&mut a, Duration::from_millis(200)).await, None);

    server.stop().await;
}

#[tokio::test]
async fn test_messages_from_one_client_arrive_in_order() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut a = server.connect("/chat").await;
    let mut b = server.connect("/chat").await;
    server.wait_for_chat_peers(2).await;

    for i in 0..5 {
        a.send(WsMessage::Text(format!("m{i}"))).await.unwrap();
    }

    for i in 0..5 {
        let text = next_text(&mut b, Duration::from_secs(5)).await.unwrap();
        assert!(text.ends_with(&format!(" wrote: m{i}")), "got {text:?}");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_echo_to_sender_delivers_own_message() {
    let server = TestServer::start(ServerConfig {
        echo_to_sender: true,
        ..ServerConfig::default()
    })
    .await;
    let mut a = server.connect("/chat").await;
    server.wait_for_chat_peers(1).await;

    a.send(WsMessage::Text("me too".into())).await.unwrap();

    let text = next_text(&mut a, Duration::from_secs(5)).await.unwrap();
    assert!(text.ends_with(" wrote: me too"));

    server.stop().await;
}

#[tokio::test]
async fn test_live_feed_pushes_timestamps_and_skips_registry() {
    // Arrange
    let server = TestServer::start(ServerConfig {
        live_feed_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    })
    .await;

    // Act
    let mut feed = server.connect("/live-feed").await;
    let first = next_text(&mut feed, Duration::from_secs(5)).await.unwrap();
    let second = next_text(&mut feed, Duration::from_secs(5)).await.unwrap();

    // Assert
    for line in [&first, &second] {
        assert!(line.starts_with("live feed data:->"), "got {line:?}");
        assert!(line.ends_with('\n'));
    }
    assert!(server.hub.registry().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_rejected_with_404() {
    let server = TestServer::start(ServerConfig::default()).await;

    let result = connect_async(format!("ws://{}/nope", server.addr)).await;

    match result {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), StatusCode::NOT_FOUND),
        Err(other) => panic!("expected HTTP 404, got error {other}"),
        Ok(_) => panic!("expected HTTP 404, got a WebSocket"),
    }
    assert!(server.hub.registry().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_custom_paths_are_routed() {
    let server = TestServer::start(ServerConfig {
        chat_path: "/talk".to_string(),
        live_feed_path: "/ticks".to_string(),
        live_feed_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    })
    .await;

    let _talker = server.connect("/talk").await;
    server.wait_for_chat_peers(1).await;
    let mut ticks = server.connect("/ticks").await;
    let line = next_text(&mut ticks, Duration::from_secs(5)).await.unwrap();

    assert!(line.starts_with("live feed data:->"));
    assert!(connect_async(format!("ws://{}/chat", server.addr)).await.is_err());

    server.stop().await;
}

#[tokio::test]
async fn test_client_disconnect_removes_it_from_registry() {
    // Arrange
    let server = TestServer::start(ServerConfig::default()).await;
    let mut leaver = server.connect("/chat").await;
    let mut stayer = server.connect("/chat").await;
    server.wait_for_chat_peers(2).await;

    // Act
    leaver.close(None).await.unwrap();
    server.wait_for_chat_peers(1).await;

    // Assert: the remaining client can still be reached
    server.hub.announce("still alive").await;
    assert_eq!(
        next_text(&mut stayer, Duration::from_secs(5)).await.as_deref(),
        Some("still alive")
    );

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_notifies_and_closes_chat_clients() {
    // Arrange
    let server = TestServer::start(ServerConfig::default()).await;
    let mut client = server.connect("/chat").await;
    server.wait_for_chat_peers(1).await;

    // Act
    let outcome = server.hub.announce("server shutting down").await;
    server.hub.shutdown();

    // Assert
    assert_eq!(outcome.delivered, 1);
    assert_eq!(
        next_text(&mut client, Duration::from_secs(5)).await.as_deref(),
        Some("server shutting down")
    );
    assert_eq!(next_text(&mut client, Duration::from_secs(5)).await, None);
    timeout(Duration::from_secs(5), server.hub.wait())
        .await
        .expect("hub tasks finished");
    assert!(server.hub.registry().is_empty());
}
