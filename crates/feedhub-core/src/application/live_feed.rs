//! Live-Feed Publisher: a per-connection timer loop.
//!
//! Every `interval` the loop writes one timestamped line to its own
//! connection.  It never touches the registry and never broadcasts: each
//! live-feed subscriber has its own independent stream.
//!
//! The first payload is written immediately on subscription; subsequent
//! payloads follow at `interval` (plus scheduling jitter).  If the subscriber
//! cannot keep up, missed ticks are delayed rather than burst.
//!
//! A failed write ends the loop for this connection only.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::broadcaster::write_with_timeout;
use crate::domain::connection::Connection;

/// Why a live-feed loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveFeedExit {
    /// A write failed or timed out; the subscriber is gone.
    WriteFailed,
    /// Hub shutdown was requested.
    Cancelled,
}

/// Builds the payload pushed at `now`.
pub fn live_feed_payload(now: DateTime<Utc>) -> Bytes {
    Bytes::from(format!(
        "live feed data:->{}\n",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    ))
}

/// Streams timestamps to `conn` every `interval` until a write fails or
/// `cancel` fires.  The connection is closed on exit.
pub async fn run_live_feed(
    conn: Arc<dyn Connection>,
    interval: Duration,
    write_timeout: Duration,
    cancel: CancellationToken,
) -> LiveFeedExit {
    let id = conn.id();
    let peer = conn.remote_addr();
    info!(conn = %id, peer = %peer, interval_ms = interval.as_millis() as u64, "live-feed subscription started");

    // `interval` panics on a zero period.
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break LiveFeedExit::Cancelled,
            _ = ticker.tick() => {}
        }

        let payload = live_feed_payload(Utc::now());
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break LiveFeedExit::Cancelled,
            written = write_with_timeout(conn.as_ref(), &payload, write_timeout) => written,
        };

        match written {
            Ok(()) => debug!(conn = %id, "live-feed tick delivered"),
            Err(e) => {
                debug!(conn = %id, peer = %peer, "live-feed write failed, stopping: {e}");
                break LiveFeedExit::WriteFailed;
            }
        }
    };

    if let Err(e) = conn.close().await {
        debug!(conn = %id, "close after live feed: {e}");
    }
    info!(conn = %id, peer = %peer, reason = ?exit, "live-feed subscription finished");
    exit
}

// ── Tests ─────────────────────────────────────────────────────────────────────
