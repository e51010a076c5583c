//! The `Hub`: one place that owns the registry, the broadcaster and every
//! per-connection task.
//!
//! The transport accepts a peer, decides which [`Endpoint`] it connected to,
//! and calls [`Hub::serve`].  The hub spawns the matching task:
//!
//! | Endpoint   | Task                                   | Registry? |
//! |------------|----------------------------------------|-----------|
//! | `Chat`     | [`run_read_loop`] + broadcaster        | yes       |
//! | `LiveFeed` | [`run_live_feed`]                      | no        |
//!
//! # Shutdown
//!
//! All tasks, including transport work started through [`Hub::spawn`], are
//! spawned on a [`TaskTracker`] and watch a shared
//! [`CancellationToken`].  [`Hub::shutdown`] cancels the token, after which
//! each task closes its connection and deregisters; [`Hub::wait`] resolves
//! once they have all finished.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::application::broadcaster::{Broadcaster, PublishOutcome};
use crate::application::live_feed::run_live_feed;
use crate::application::read_loop::{run_read_loop, ReadLoopOptions};
use crate::application::registry::Registry;
use crate::domain::connection::Connection;
use crate::domain::endpoint::Endpoint;
use crate::domain::message::Message;

/// Hub-level settings.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Period of the live-feed push.
    pub live_feed_interval: Duration,
    /// Upper bound for any single write to a peer.
    pub write_timeout: Duration,
    /// Read buffer size for chat connections.
    pub read_buffer_size: usize,
    /// Deliver a chat message back to its own sender as well.
    pub echo_to_sender: bool,
    /// Consecutive transient read errors tolerated before a chat connection
    /// is dropped.
    pub max_transient_read_retries: u32,
}

impl Default for HubConfig {
    /// | Field                      | Default |
    /// |----------------------------|---------|
    /// | live_feed_interval         | 2 s     |
    /// | write_timeout              | 5 s     |
    /// | read_buffer_size           | 1024    |
    /// | echo_to_sender             | false   |
    /// | max_transient_read_retries | 3       |
    fn default() -> Self {
        Self {
            live_feed_interval: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            read_buffer_size: 1024,
            echo_to_sender: false,
            max_transient_read_retries: 3,
        }
    }
}

/// Coordinates the registry, the broadcaster and per-connection tasks.
pub struct Hub {
    config: HubConfig,
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(
            Arc::clone(&registry),
            config.write_timeout,
            config.echo_to_sender,
        );
        Self {
            config,
            registry,
            broadcaster,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The live chat registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// A clone of the hub's shutdown token, for accept loops that should stop
    /// together with the hub.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Starts the task for `conn` on `endpoint` and returns its handle.
    ///
    /// After shutdown has begun the spawned task exits on its first
    /// cancellation check and closes the connection.
    pub fn serve(&self, conn: Arc<dyn Connection>, endpoint: Endpoint) -> JoinHandle<()> {
        let cancel = self.shutdown.clone();
        info!(conn = %conn.id(), peer = %conn.remote_addr(), %endpoint, "serving connection");

        match endpoint {
            Endpoint::Chat => {
                let broadcaster = self.broadcaster.clone();
                let options = ReadLoopOptions {
                    buffer_size: self.config.read_buffer_size,
                    max_transient_retries: self.config.max_transient_read_retries,
                };
                self.tasks.spawn(async move {
                    run_read_loop(conn, broadcaster, options, cancel).await;
                })
            }
            Endpoint::LiveFeed => {
                let interval = self.config.live_feed_interval;
                let write_timeout = self.config.write_timeout;
                self.tasks.spawn(async move {
                    run_live_feed(conn, interval, write_timeout, cancel).await;
                })
            }
        }
    }

    /// Runs `future` on the hub's task tracker, so [`wait`](Self::wait) also
    /// covers it.
    ///
    /// Transports use this for per-peer work that starts before a connection
    /// exists, such as a WebSocket handshake.  The future should watch
    /// [`shutdown_token`](Self::shutdown_token) or `wait` will not return.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(future)
    }

    /// Publishes a system message to every chat connection.
    pub async fn announce(&self, text: impl Into<String>) -> PublishOutcome {
        let text = text.into();
        debug!(%text, "announcing system message");
        self.broadcaster.publish(Message::system(text)).await
    }

    /// Signals every per-connection task to stop.  Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(chat_connections = self.registry.len(), "hub shutting down");
        }
        self.shutdown.cancel();
        self.tasks.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until every task spawned by [`serve`](Self::serve) has finished.
    ///
    /// Only resolves after [`shutdown`](Self::shutdown) has been called.
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }

    /// Number of per-connection tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
