//! Application layer: the hub's moving parts.
//!
//! - **`registry`**    – Thread-safe set of live chat connections.
//! - **`broadcaster`** – Fans one message out to every connection in a
//!   registry snapshot, isolating per-connection failures.
//! - **`read_loop`**   – Per-connection task: read, tag, publish, repeat.
//! - **`live_feed`**   – Per-connection timer loop pushing timestamps.
//! - **`hub`**         – Owns the above and spawns the right loop for each
//!   accepted connection.

pub mod broadcaster;
pub mod hub;
pub mod live_feed;
pub mod read_loop;
pub mod registry;
