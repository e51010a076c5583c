//! Connection Registry: the set of live chat connections.
//!
//! The registry is the single piece of shared mutable state in the hub.  Read
//! loops add and remove themselves, the broadcaster removes connections whose
//! writes fail, and every publish iterates over a snapshot.
//!
//! # Concurrency discipline
//!
//! All three operations run under one `std::sync::Mutex`.  The lock guards
//! bookkeeping only: no `.await` and no I/O happen while it is held, so a
//! blocking mutex is the right tool and never stalls the async runtime for
//! more than a `HashMap` operation.
//!
//! # Snapshot semantics
//!
//! [`Registry::snapshot`] copies the current `Arc<dyn Connection>` handles into
//! a fresh `Vec`.  Later `add`/`remove` calls never change a snapshot already
//! taken (copy-on-read).
//!
//! # Poisoning
//!
//! Registry operations have no error channel.  A panic in another thread while
//! holding the lock cannot leave the map half-updated (every critical section
//! is a single `HashMap` call), so a poisoned lock is recovered with
//! `PoisonError::into_inner`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::connection::{Connection, ConnectionId};

/// Thread-safe registry of live connections keyed by [`ConnectionId`].
///
/// Presence in the map is the liveness flag: a connection in the registry is
/// open and eligible for broadcast; absence means it receives no further
/// broadcasts.  Entries are never resurrected.
#[derive(Default)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `conn` as live.
    ///
    /// Idempotent: returns `false` and leaves the existing entry untouched if
    /// a connection with the same id is already present.
    pub fn add(&self, conn: Arc<dyn Connection>) -> bool {
        let mut map = self.lock();
        let id = conn.id();
        if map.contains_key(&id) {
            return false;
        }
        map.insert(id, conn);
        true
    }

    /// Removes the connection `id` if present.
    ///
    /// Returns `true` only for the call that actually removed the entry, so
    /// concurrent removers (read loop vs. broadcaster) can tell which of them
    /// deregistered the connection.  Removing an absent id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Returns an independent copy of all currently live connections.
    pub fn snapshot(&self) -> Vec<Arc<dyn Connection>> {
        self.lock().values().cloned().collect()
    }

    /// Returns `true` if `id` is currently registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<dyn Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
