//! feedhub server: entry point.
//!
//! Accepts WebSocket connections on two endpoints:
//!
//! - **`/chat`**: every message a client sends is broadcast to every other
//!   connected chat client as `user <addr> wrote: <message>`.
//! - **`/live-feed`**: the server pushes `live feed data:-><timestamp>` to
//!   the client every couple of seconds.
//!
//! # Usage
//!
//! ```text
//! feedhub [OPTIONS]
//!
//! Options:
//!   --config <PATH>              Optional TOML config file
//!   --bind <IP>                  Listener IP address [default: 0.0.0.0]
//!   --port <PORT>                Listener port [default: 3000]
//!   --chat-path <PATH>           Chat endpoint path [default: /chat]
//!   --live-feed-path <PATH>      Live-feed endpoint path [default: /live-feed]
//!   --feed-interval-ms <MS>      Live-feed period [default: 2000]
//!   --write-timeout-ms <MS>      Per-write bound [default: 5000]
//!   --handshake-timeout-ms <MS>  Upgrade bound [default: 10000]
//!   --read-buffer <BYTES>        Per-connection read buffer [default: 1024]
//!   --echo-to-sender             Also deliver chat messages to their sender
//!   --shutdown-grace-ms <MS>     Wait for connections on Ctrl+C [default: 3000]
//! ```
//!
//! # Precedence
//!
//! CLI flag (or its environment variable) > config file > built-in default.
//!
//! | Variable                   | Flag                 |
//! |----------------------------|----------------------|
//! | `FEEDHUB_CONFIG`           | `--config`           |
//! | `FEEDHUB_BIND`             | `--bind`             |
//! | `FEEDHUB_PORT`             | `--port`             |
//! | `FEEDHUB_CHAT_PATH`        | `--chat-path`        |
//! | `FEEDHUB_FEED_PATH`        | `--live-feed-path`   |
//! | `FEEDHUB_FEED_INTERVAL_MS` | `--feed-interval-ms` |
//! | `FEEDHUB_WRITE_TIMEOUT_MS` | `--write-timeout-ms` |
//! | `FEEDHUB_READ_BUFFER`      | `--read-buffer`      |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use feedhub_core::Hub;
use feedhub_server::domain::ServerConfig;
use feedhub_server::infrastructure::{load_config_file, run_server, FileConfig};

/// Sent to every chat client when the server is asked to stop.
const SHUTDOWN_NOTICE: &str = "server shutting down";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// feedhub: WebSocket chat broadcast and live-feed server.
///
/// Every option is optional so that a value from `--config` can fill in
/// whatever was not given on the command line.
#[derive(Debug, Default, Parser)]
#[command(
    name = "feedhub",
    about = "WebSocket chat broadcast and live-feed server",
    version
)]
struct Cli {
    /// TOML file with any of the settings below.
    #[arg(long, value_name = "PATH", env = "FEEDHUB_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the listener to.
    ///
    /// `0.0.0.0` accepts connections on every interface; `127.0.0.1` only
    /// from this machine.
    #[arg(long, value_name = "IP", env = "FEEDHUB_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "FEEDHUB_PORT")]
    port: Option<u16>,

    /// Request path of the chat endpoint.
    #[arg(long, value_name = "PATH", env = "FEEDHUB_CHAT_PATH")]
    chat_path: Option<String>,

    /// Request path of the live-feed endpoint.
    #[arg(long, value_name = "PATH", env = "FEEDHUB_FEED_PATH")]
    live_feed_path: Option<String>,

    /// Live-feed push period in milliseconds.
    #[arg(long, value_name = "MS", env = "FEEDHUB_FEED_INTERVAL_MS")]
    feed_interval_ms: Option<u64>,

    /// Upper bound for one write to one client, in milliseconds.
    ///
    /// A client that does not accept a frame in time is disconnected.
    #[arg(long, value_name = "MS", env = "FEEDHUB_WRITE_TIMEOUT_MS")]
    write_timeout_ms: Option<u64>,

    /// Upper bound for the WebSocket upgrade, in milliseconds.
    #[arg(long, value_name = "MS")]
    handshake_timeout_ms: Option<u64>,

    /// Read buffer size per chat connection, in bytes.
    #[arg(long, value_name = "BYTES", env = "FEEDHUB_READ_BUFFER")]
    read_buffer: Option<usize>,

    /// Deliver chat messages back to their sender too.
    #[arg(long)]
    echo_to_sender: bool,

    /// How long Ctrl+C waits for open connections to wind down, in
    /// milliseconds.
    #[arg(long, value_name = "MS")]
    shutdown_grace_ms: Option<u64>,
}

impl Cli {
    /// Builds the [`ServerConfig`], reading `--config` if it was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged configuration is invalid.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let file = match &self.config {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    /// Layers CLI values over `file` over the defaults, then validates.
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address or the result fails
    /// [`ServerConfig::validate`].
    fn merge(self, file: FileConfig) -> anyhow::Result<ServerConfig> {
        let defaults = ServerConfig::default();

        let ip: IpAddr = match self.bind {
            Some(bind) => bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?,
            None => file.bind.unwrap_or_else(|| defaults.bind_addr.ip()),
        };
        let port = self
            .port
            .or(file.port)
            .unwrap_or_else(|| defaults.bind_addr.port());

        let millis = |flag: Option<u64>, from_file: Option<u64>, default: Duration| {
            flag.or(from_file).map(Duration::from_millis).unwrap_or(default)
        };

        let config = ServerConfig {
            bind_addr: SocketAddr::new(ip, port),
            chat_path: self
                .chat_path
                .or(file.chat_path)
                .unwrap_or(defaults.chat_path),
            live_feed_path: self
                .live_feed_path
                .or(file.live_feed_path)
                .unwrap_or(defaults.live_feed_path),
            live_feed_interval: millis(
                self.feed_interval_ms,
                file.feed_interval_ms,
                defaults.live_feed_interval,
            ),
            write_timeout: millis(
                self.write_timeout_ms,
                file.write_timeout_ms,
                defaults.write_timeout,
            ),
            handshake_timeout: millis(
                self.handshake_timeout_ms,
                file.handshake_timeout_ms,
                defaults.handshake_timeout,
            ),
            read_buffer_size: self
                .read_buffer
                .or(file.read_buffer)
                .unwrap_or(defaults.read_buffer_size),
            echo_to_sender: self.echo_to_sender
                || file.echo_to_sender.unwrap_or(defaults.echo_to_sender),
            shutdown_grace: millis(
                self.shutdown_grace_ms,
                file.shutdown_grace_ms,
                defaults.shutdown_grace,
            ),
        };

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level
///    (default `info`).
/// 2. CLI arguments (and the optional config file) become a [`ServerConfig`].
/// 3. A [`Hub`] is created from the hub-level settings.
/// 4. A Ctrl+C handler is spawned.  It tells chat clients the server is going
///    away, then shuts the hub down, which also stops the accept loop.
/// 5. [`run_server`] binds the port and accepts connections until then.
/// 6. Open connections get `shutdown_grace` to close before the process exits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    let grace = config.shutdown_grace;

    info!(
        "feedhub starting: bind={}, feed interval={:?}, write timeout={:?}, echo={}",
        config.bind_addr, config.live_feed_interval, config.write_timeout, config.echo_to_sender
    );

    let hub = Arc::new(Hub::new(config.hub_config()));

    // ── Graceful shutdown ──────────────────────────────────────────────────────
    let hub_signal = Arc::clone(&hub);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                let outcome = hub_signal.announce(SHUTDOWN_NOTICE).await;
                debug!(
                    delivered = outcome.delivered,
                    removed = outcome.removed.len(),
                    "shutdown notice sent"
                );
                hub_signal.shutdown();
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ───────────────────────────────────────────────────────
    let served = run_server(config, Arc::clone(&hub)).await;

    hub.shutdown();
    if tokio::time::timeout(grace, hub.wait()).await.is_err() {
        warn!(
            remaining = hub.active_tasks(),
            "shutdown grace period elapsed with connections still open"
        );
    }

    served?;
    info!("feedhub stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
