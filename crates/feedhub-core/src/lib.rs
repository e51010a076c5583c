//! # feedhub-core
//!
//! The in-process hub behind the feedhub chat and live-feed service.  It owns
//! the only shared mutable state in the system (the connection registry) and
//! the per-connection tasks that read from and write to peers.
//!
//! This crate has no dependency on sockets or WebSocket framing.  Peers are
//! reached through the [`Connection`] trait, which the server crate implements
//! on top of `tokio-tungstenite`.
//!
//! # Architecture overview (for beginners)
//!
//! ```text
//! accepted Connection ──► Hub::serve(conn, endpoint)
//!                            │
//!          ┌─────────────────┴──────────────────┐
//!          ▼ Endpoint::Chat                     ▼ Endpoint::LiveFeed
//!      Read Loop                          Live-Feed Publisher
//!          │ Message (tagged with sender)       │ timestamp every interval
//!          ▼                                    ▼
//!      Broadcaster ──► Registry::snapshot()   own connection only
//!          │
//!          ▼ one concurrent write per live connection
//! ```
//!
//! - **`domain`** – Pure types: the `Connection` seam, `Message`, `Endpoint`.
//! - **`application`** – Registry, Broadcaster, Read Loop, Live-Feed
//!   Publisher, and the `Hub` that wires them together.
//! - **`infrastructure`** – An in-memory `Connection` used by tests and by
//!   embedders that do not need a network.

pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the most-used types at the crate root so callers can write
// `feedhub_core::Hub` instead of `feedhub_core::application::hub::Hub`.
pub use application::broadcaster::{Broadcaster, PublishOutcome};
pub use application::hub::{Hub, HubConfig};
pub use application::live_feed::{live_feed_payload, run_live_feed, LiveFeedExit};
pub use application::read_loop::{run_read_loop, ReadLoopExit, ReadLoopOptions};
pub use application::registry::Registry;
pub use domain::connection::{Connection, ConnectionError, ConnectionId};
pub use domain::endpoint::Endpoint;
pub use domain::message::{Message, Origin};
