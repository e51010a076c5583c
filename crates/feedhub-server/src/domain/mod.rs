//! Domain layer for feedhub-server.
//!
//! Pure configuration types with no dependency on sockets, files or the
//! environment.  Populating them is the job of `main.rs` and the
//! infrastructure layer.

pub mod config;

pub use config::{InvalidConfig, ServerConfig};
