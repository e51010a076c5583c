//! Domain layer for feedhub-core.
//!
//! Pure types with no I/O of their own: the [`Connection`] seam that the
//! transport implements, the [`Message`] value that flows through the
//! broadcaster, and the [`Endpoint`] tag that decides what a connection does
//! after its handshake.
//!
//! # What does NOT belong here?
//!
//! - Locks, task spawning, timers (that is the application layer)
//! - Any `TcpStream` or WebSocket types (that is the server crate)

pub mod connection;
pub mod endpoint;
pub mod message;

pub use connection::{Connection, ConnectionError, ConnectionId};
pub use endpoint::Endpoint;
pub use message::{Message, Origin};
