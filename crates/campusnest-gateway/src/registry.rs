use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use campusnest_types::events::LiveEvent;

/// How long a dispatch may wait on a full per-connection queue before the
/// handle is considered stale.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-connection outbound queue depth.
pub const HANDLE_BUFFER: usize = 64;

pub type ConnectionId = Uuid;

/// Sending half of one live connection. The registry entry owns the only
/// long-lived clone, so dropping the entry closes the connection's queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<LiveEvent>,
}

impl ConnectionHandle {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Outcome of a dispatch. Never an error: the caller has nothing to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the recipient's live connection
    Delivered,
    /// No connection registered for the recipient
    Offline,
    /// The connection was stalled or gone; its entry has been removed
    Dropped,
}

/// Process-local directory of live connections: at most one per user.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// user_id -> live handle
    connections: RwLock<HashMap<Uuid, ConnectionHandle>>,
    dispatch_timeout: Duration,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_dispatch_timeout(DEFAULT_DISPATCH_TIMEOUT)
    }

    pub fn with_dispatch_timeout(dispatch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: RwLock::new(HashMap::new()),
                dispatch_timeout,
            }),
        }
    }

    // The map is only touched inside these guards and no guard is ever held
    // across an await, so a poisoned lock still holds a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, ConnectionHandle>> {
        self.inner
            .connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, ConnectionHandle>> {
        self.inner
            .connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `handle` for `user_id`, last writer wins. A superseded handle is
    /// dropped here, which closes its queue and ends that connection.
    /// Returns true if a previous handle was replaced.
    pub fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> bool {
        let conn_id = handle.id;
        let previous = self.write().insert(user_id, handle);

        match previous {
            Some(old) => {
                info!(
                    "{} re-registered: connection {} supersedes {}",
                    user_id, conn_id, old.id
                );
                true
            }
            None => false,
        }
    }

    /// Remove whatever handle is registered for `user_id`. No-op if absent.
    pub fn unregister(&self, user_id: Uuid) -> bool {
        self.write().remove(&user_id).is_some()
    }

    /// Remove the entry only if it still belongs to `conn_id`, so a
    /// superseded connection cannot evict its replacement.
    pub fn unregister_connection(&self, user_id: Uuid, conn_id: ConnectionId) -> bool {
        let mut connections = self.write();
        match connections.get(&user_id) {
            Some(handle) if handle.id == conn_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Create a handle, register it, and return a guard that unregisters it
    /// when dropped, plus the receiving end of the connection's queue.
    pub fn connect(&self, user_id: Uuid) -> (Registration, mpsc::Receiver<LiveEvent>) {
        let (handle, rx) = ConnectionHandle::new(HANDLE_BUFFER);
        let conn_id = handle.id();
        self.register(user_id, handle);

        (
            Registration {
                registry: self.clone(),
                user_id,
                conn_id,
            },
            rx,
        )
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.read().contains_key(&user_id)
    }

    pub fn connection_id(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.read().get(&user_id).map(|h| h.id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Best-effort push of `event` to `user_id`. Waits at most the dispatch
    /// timeout; a stalled or closed handle is unregistered.
    pub async fn dispatch(&self, user_id: Uuid, event: LiveEvent) -> Delivery {
        let handle = self.read().get(&user_id).cloned();

        let Some(handle) = handle else {
            debug!("{} offline, dropping {} event", user_id, event.kind());
            return Delivery::Offline;
        };

        match handle.tx.send_timeout(event, self.inner.dispatch_timeout).await {
            Ok(()) => Delivery::Delivered,
            Err(SendTimeoutError::Timeout(event)) => {
                warn!(
                    "{} connection {} stalled, dropping {} event and unregistering",
                    user_id,
                    handle.id,
                    event.kind()
                );
                self.unregister_connection(user_id, handle.id);
                Delivery::Dropped
            }
            Err(SendTimeoutError::Closed(event)) => {
                warn!(
                    "{} connection {} closed, dropping {} event and unregistering",
                    user_id,
                    handle.id,
                    event.kind()
                );
                self.unregister_connection(user_id, handle.id);
                Delivery::Dropped
            }
        }
    }
}

/// Scoped registration of one connection. Dropping it unregisters that
/// connection exactly once, whichever way the connection ends.
pub struct Registration {
    registry: ConnectionRegistry,
    user_id: Uuid,
    conn_id: ConnectionId,
}

impl Registration {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.unregister_connection(self.user_id, self.conn_id) {
            debug!("{} connection {} unregistered", self.user_id, self.conn_id);
        }
    }
}
