//! Infrastructure layer for feedhub-core.
//!
//! The real network transport lives in the `feedhub-server` crate.  This
//! module only provides [`memory::MemoryConnection`], an in-process
//! [`Connection`](crate::Connection) driven from the other end by a
//! [`memory::MemoryPeer`].  Tests use it to script reads, observe writes and
//! inject failures without opening a socket.

pub mod memory;

pub use memory::{MemoryConnection, MemoryPeer};
