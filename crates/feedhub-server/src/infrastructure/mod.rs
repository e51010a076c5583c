//! Infrastructure layer for feedhub-server.
//!
//! Everything that touches the outside world lives here: the optional config
//! file, the TCP listener and the WebSocket framing.
//!
//! # What does NOT belong here?
//!
//! - Fan-out, liveness and live-feed logic (that is `feedhub-core`)
//! - Configuration types and validation (that is the domain layer)
//! - CLI parsing (that is done in `main.rs`)

pub mod config_file;
pub mod ws_connection;
pub mod ws_server;

pub use config_file::{load_config_file, ConfigError, FileConfig};
pub use ws_connection::WsConnection;
pub use ws_server::{bind, run_server, serve};
