//! Broadcaster: fan one message out to every live chat connection.
//!
//! # Fan-out with isolation
//!
//! [`Broadcaster::publish`] takes a registry snapshot and spawns one Tokio
//! task per recipient.  Each task performs a single write bounded by
//! `write_timeout`:
//!
//! ```text
//! publish(msg)
//!   ├─ snapshot = registry.snapshot()      (lock held only for the copy)
//!   ├─ spawn write(A)  ──► ok
//!   ├─ spawn write(B)  ──► error    ──► registry.remove(B), close(B)
//!   └─ spawn write(C)  ──► timeout  ──► registry.remove(C), close(C)
//!   wait for all tasks (each bounded by write_timeout)
//! ```
//!
//! A failing or stalled recipient only costs the caller at most one
//! `write_timeout`; it never delays the other writes, which run concurrently.
//! Every connection in the snapshot either receives the message exactly once
//! or is removed from the registry, even when its write task panics.
//!
//! Waiting for the tasks before returning keeps a single sender's messages in
//! read order at every recipient: publish N has finished with each recipient
//! before publish N+1 starts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::{self, JoinSet};
use tracing::{debug, warn};

use crate::application::registry::Registry;
use crate::domain::connection::{Connection, ConnectionError, ConnectionId};
use crate::domain::message::Message;

/// Summary of one [`Broadcaster::publish`] call.
///
/// Informational only: a publish never fails as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Recipients whose write completed successfully.
    pub delivered: usize,
    /// Recipients removed from the registry because their write failed or
    /// timed out.
    pub removed: Vec<ConnectionId>,
}

/// Sends messages to every connection in a [`Registry`].
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    write_timeout: Duration,
    echo_to_sender: bool,
}

impl Broadcaster {
    /// Creates a broadcaster over `registry`.
    ///
    /// `write_timeout` bounds every individual write.  When `echo_to_sender`
    /// is `false`, a peer's message is not written back to the peer itself.
    pub fn new(registry: Arc<Registry>, write_timeout: Duration, echo_to_sender: bool) -> Self {
        Self {
            registry,
            write_timeout,
            echo_to_sender,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Delivers `message` to every live connection.
    ///
    /// Never fails: a recipient whose write errors or exceeds the write
    /// timeout is logged, removed from the registry and closed; the remaining
    /// recipients are unaffected.
    pub async fn publish(&self, message: Message) -> PublishOutcome {
        let sender = message.sender();
        let recipients: Vec<Arc<dyn Connection>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|conn| self.echo_to_sender || Some(conn.id()) != sender)
            .collect();

        if recipients.is_empty() {
            debug!(origin = ?message.origin(), "publish: no recipients");
            return PublishOutcome::default();
        }

        // Render once; every task shares the same reference-counted buffer.
        let wire = message.to_wire();
        let mut writes = JoinSet::new();
        // Task id -> recipient, so a task that panics can still be dropped.
        let mut in_flight: HashMap<task::Id, Arc<dyn Connection>> = HashMap::new();
        for conn in recipients {
            let wire: Bytes = wire.clone();
            let limit = self.write_timeout;
            let registry = Arc::clone(&self.registry);
            let owner = Arc::clone(&conn);
            let handle = writes.spawn(async move {
                let result = write_with_timeout(conn.as_ref(), &wire, limit).await;
                // Deregister before closing so the owning read loop, which
                // wakes up on the close, never wins the removal.
                let removed = result.is_err() && registry.remove(conn.id());
                if result.is_err() {
                    if let Ok(Err(e)) = tokio::time::timeout(limit, conn.close()).await {
                        debug!(conn = %conn.id(), "close after failed write: {e}");
                    }
                }
                (conn, result, removed)
            });
            in_flight.insert(handle.id(), owner);
        }

        let mut outcome = PublishOutcome::default();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()), _)) => outcome.delivered += 1,
                Ok((conn, Err(e), removed)) => {
                    let id = conn.id();
                    warn!(
                        conn = %id,
                        peer = %conn.remote_addr(),
                        "broadcast write failed, dropping connection: {e}"
                    );
                    if removed {
                        outcome.removed.push(id);
                    }
                }
                Err(e) => {
                    let Some(conn) = in_flight.remove(&e.id()) else {
                        warn!("broadcast write task aborted: {e}");
                        continue;
                    };
                    let id = conn.id();
                    warn!(
                        conn = %id,
                        peer = %conn.remote_addr(),
                        "broadcast write task aborted, dropping connection: {e}"
                    );
                    if self.registry.remove(id) {
                        outcome.removed.push(id);
                    }
                    if let Ok(Err(e)) = tokio::time::timeout(self.write_timeout, conn.close()).await {
                        debug!(conn = %id, "close after aborted write: {e}");
                    }
                }
            }
        }

        debug!(
            origin = ?message.origin(),
            delivered = outcome.delivered,
            removed = outcome.removed.len(),
            "broadcast complete"
        );
        outcome
    }
}

/// Writes `payload` to `conn`, failing with [`ConnectionError::TimedOut`] if
/// the write does not finish within `limit`.
pub(crate) async fn write_with_timeout(
    conn: &dyn Connection,
    payload: &[u8],
    limit: Duration,
) -> Result<(), ConnectionError> {
    match tokio::time::timeout(limit, conn.write(payload)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::TimedOut(limit)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
