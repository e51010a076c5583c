//! Messages flowing from read loops (or the hub itself) to the broadcaster.
//!
//! A [`Message`] is an immutable payload plus an [`Origin`] tag.  It is built
//! once, handed to [`Broadcaster::publish`](crate::Broadcaster::publish) by
//! value, rendered to its wire form once, and then dropped.
//!
//! # Wire form
//!
//! ```text
//! Origin::Peer   →  "user 10.0.0.7:51234 wrote: hello"
//! Origin::System →  "server shutting down"          (payload unchanged)
//! ```

use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};

use super::connection::ConnectionId;

/// Who produced a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced by the hub itself (e.g. a shutdown notice).
    System,
    /// Read from a chat connection.
    Peer {
        /// The sending connection.
        id: ConnectionId,
        /// The sender's remote address, used in the rendered text.
        addr: SocketAddr,
    },
}

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    origin: Origin,
    payload: Bytes,
}

impl Message {
    /// Builds a message read from the connection `id` at `addr`.
    pub fn from_peer(id: ConnectionId, addr: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            origin: Origin::Peer { id, addr },
            payload: payload.into(),
        }
    }

    /// Builds a message produced by the hub itself.
    pub fn system(payload: impl Into<Bytes>) -> Self {
        Self {
            origin: Origin::System,
            payload: payload.into(),
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// The raw payload as received, without the sender prefix.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the id of the sending connection, if any.
    pub fn sender(&self) -> Option<ConnectionId> {
        match self.origin {
            Origin::Peer { id, .. } => Some(id),
            Origin::System => None,
        }
    }

    /// Renders the bytes that recipients actually receive.
    pub fn to_wire(&self) -> Bytes {
        match self.origin {
            Origin::System => self.payload.clone(),
            Origin::Peer { addr, .. } => {
                let prefix = format!("user {addr} wrote: ");
                let mut buf = BytesMut::with_capacity(prefix.len() + self.payload.len());
                buf.put_slice(prefix.as_bytes());
                buf.put_slice(&self.payload);
                buf.freeze()
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.0.0.7:51234".parse().unwrap()
    }

    #[test]
    fn test_peer_message_wire_form_is_prefixed_with_sender_address() {
        // Arrange
        let msg = Message::from_peer(ConnectionId::new(), addr(), &b"hello"[..]);

        // Act
        let wire = msg.to_wire();

        // Assert
        assert_eq!(&wire[..], b"user 10.0.0.7:51234 wrote: hello");
    }

    #[test]
    fn test_system_message_wire_form_is_payload_unchanged() {
        let msg = Message::system("server shutting down");
        assert_eq!(&msg.to_wire()[..], b"server shutting down");
    }

    #[test]
    fn test_binary_payload_is_appended_verbatim() {
        let msg = Message::from_peer(ConnectionId::new(), addr(), vec![0xFF, 0x00, 0x7F]);
        let wire = msg.to_wire();
        assert_eq!(&wire[wire.len() - 3..], &[0xFF, 0x00, 0x7F]);
    }

    #[test]
    fn test_sender_is_none_for_system_messages() {
        assert_eq!(Message::system("x").sender(), None);
    }

    #[test]
    fn test_sender_matches_peer_id() {
        let id = ConnectionId::new();
        let msg = Message::from_peer(id, addr(), "x");
        assert_eq!(msg.sender(), Some(id));
        assert_eq!(msg.origin(), Origin::Peer { id, addr: addr() });
        assert_eq!(&msg.payload()[..], b"x");
    }
}
