//! ==============================================================================
//! hub.rs - broadcast hub for live viewer connections
//! ==============================================================================
//!
//! purpose:
//!     holds every live viewer connection and fans one snapshot out to all of
//!     them. the snapshot is serialized once; each connection gets the same
//!     text frame.
//!
//! failure model:
//!     a connection that is not open, or whose send fails or outlives the send
//!     timeout, is dropped from the registry. the other connections still get the frame and the caller of
//!     broadcast never sees the error.
//!
//! locking:
//!     the registry lock is only held to copy the current connection list or
//!     to insert/remove. it is never held across network i/o.
//!
//! ```text
//!     broadcast ──► lock ─► copy Arc list ─► unlock
//!                                │
//!              ┌─────────────────┼─────────────────┐
//!              ▼                 ▼                 ▼
//!           send #1           send #2           send #3     (joined, each bounded)
//!              │                 │                 ✗ ─► remove(#3)
//! ```
//!
//! relationships:
//!     - fed by: sampler.rs (SnapshotSink)
//!     - populated by: server.rs (register on accept, remove on close)
//!
//! ==============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use crate::domain::{ControlMessage, Snapshot};
use crate::error::{Result, TelemetryError};
use crate::sampler::SnapshotSink;

pub type ConnectionId = Uuid;

/// one live duplex channel to a viewer
pub trait Connection: Send + Sync + 'static {
    fn is_open(&self) -> bool;

    /// send one text frame
    fn send_text(&self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// send the close frame; resolves once it is written, not when the peer answers
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// upper bound on one send to one viewer
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Hub<C: Connection> {
    connections: Mutex<HashMap<ConnectionId, Arc<C>>>,
    send_timeout: Duration,
}

impl<C: Connection> Default for Hub<C> {
    fn default() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }
}

impl<C: Connection> Hub<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self { connections: Mutex::new(HashMap::new()), send_timeout }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<C>>> {
        // a panic elsewhere must not take the hub down with it
        self.connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, connection: Arc<C>) -> ConnectionId {
        let id = Uuid::new_v4();
        let total = {
            let mut registry = self.registry();
            registry.insert(id, connection);
            registry.len()
        };
        tracing::info!("[HUB] Viewer connected: {} ({} live)", id, total);
        id
    }

    /// drop a connection; returns false if it was already gone
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.registry().remove(id).is_some();
        if removed {
            tracing::info!("[HUB] Viewer removed: {}", id);
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.registry().len()
    }

    fn live_connections(&self) -> Vec<(ConnectionId, Arc<C>)> {
        self.registry().iter().map(|(id, c)| (*id, Arc::clone(c))).collect()
    }

    /// serialize once and send to every viewer; returns how many got it
    pub async fn broadcast(&self, snapshot: &Snapshot) -> usize {
        if snapshot.is_empty() {
            return 0;
        }
        match snapshot.to_wire() {
            Ok(frame) => self.publish(&frame).await,
            Err(e) => {
                tracing::error!("[HUB] Failed to serialize snapshot: {}", e);
                0
            }
        }
    }

    /// send a control payload (`{"message", "timestamp"}`) to every viewer
    pub async fn announce(&self, message: &str) -> usize {
        match serde_json::to_string(&ControlMessage::now(message)) {
            Ok(frame) => self.publish(&frame).await,
            Err(e) => {
                tracing::error!("[HUB] Failed to serialize message: {}", e);
                0
            }
        }
    }

    async fn publish(&self, frame: &str) -> usize {
        let targets = self.live_connections();
        if targets.is_empty() {
            tracing::debug!("[HUB] No viewers connected");
            return 0;
        }

        let (open, closed): (Vec<_>, Vec<_>) = targets.into_iter().partition(|(_, c)| c.is_open());
        for (id, _) in &closed {
            self.remove(id);
        }

        let bound = self.send_timeout;
        let sends: Vec<_> = open
            .iter()
            .map(|(id, connection)| async move {
                (*id, tokio::time::timeout(bound, connection.send_text(frame)).await)
            })
            .collect();
        let results = join_all(sends).await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!("[HUB] Send to {} failed: {}", id, e);
                    self.remove(&id);
                }
                Err(_) => {
                    tracing::warn!("[HUB] Send to {} stalled for {:?}, dropping it", id, bound);
                    self.remove(&id);
                }
            }
        }

        tracing::trace!("[HUB] Frame sent to {} viewers", delivered);
        delivered
    }

    /// send a close frame to every connection, wait at most `timeout` for the
    /// frames to go out, then empty the registry.
    ///
    /// the peers' close replies are not awaited here; each socket's own read
    /// loop sees them and unregisters.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let targets = self.live_connections();
        tracing::info!("[HUB] Closing {} viewer connections...", targets.len());

        let closes: Vec<_> = targets
            .iter()
            .filter(|(_, c)| c.is_open())
            .map(|(id, c)| async move { (*id, c.close().await) })
            .collect();
        let closes = join_all(closes);

        let outcome = match tokio::time::timeout(timeout, closes).await {
            Ok(results) => {
                for (id, result) in results {
                    if let Err(e) = result {
                        tracing::warn!("[HUB] Close of {} failed: {}", id, e);
                    }
                }
                Ok(())
            }
            Err(_) => {
                tracing::warn!("[HUB] Close frames still pending after {:?}", timeout);
                Err(TelemetryError::ShutdownTimeout(timeout))
            }
        };

        self.registry().clear();
        tracing::info!("[HUB] All viewer connections closed");
        outcome
    }
}

impl<C: Connection> SnapshotSink for Hub<C> {
    async fn deliver(&self, snapshot: Snapshot) {
        self.broadcast(&snapshot).await;
    }
}
