//! feedhub-server library crate.
//!
//! The WebSocket front end of feedhub.  It accepts browser (or any RFC 6455)
//! clients, routes each one to the chat or live-feed endpoint by request
//! path, and hands the upgraded socket to [`feedhub_core::Hub`].
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket client
//!         ↕
//! [feedhub-server]
//!   ├── domain/           ServerConfig, endpoint paths
//!   └── infrastructure/
//!         ├── config_file/   optional TOML config
//!         ├── ws_connection/ WebSocketStream → feedhub_core::Connection
//!         └── ws_server/     accept loop + handshake routing
//!         ↕
//! [feedhub-core]  Hub: registry, broadcaster, read loop, live feed
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `infrastructure` depends on `domain`, `feedhub-core`, `tokio` and
//!   `tokio-tungstenite`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Infrastructure layer: config file, WebSocket adapter, accept loop.
pub mod infrastructure;
