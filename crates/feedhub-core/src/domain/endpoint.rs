//! Which behaviour a connection runs after its handshake.
//!
//! The accepting endpoint decides, not the connection's content: a peer that
//! connected to the chat endpoint is a chat participant for its whole
//! lifetime, and a live-feed subscriber never joins the chat registry.

use std::fmt;

/// The two logical endpoints served by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Read loop + broadcaster: inbound messages fan out to all chat peers.
    Chat,
    /// Periodic single-recipient timestamp stream.
    LiveFeed,
}

impl Endpoint {
    /// Short lowercase name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Chat => "chat",
            Endpoint::LiveFeed => "live-feed",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
