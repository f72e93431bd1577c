// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard to ensure a promoted replica is always deregistered when its
/// connection task exits, on any path (normal close, error, panic unwind).
pub struct ConnectionGuard {
    pub(crate) state: Arc<ServerState>,
    pub(crate) addr: SocketAddr,
    /// Set once `PSYNC` promotes this connection; `None` for a plain client.
    pub(crate) replica_id: Option<u64>,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ServerState>, addr: SocketAddr) -> Self {
        Self {
            state,
            addr,
            replica_id: None,
        }
    }

    /// Marks this connection as a promoted replica, so `Drop` removes it from
    /// the replica registry instead of doing nothing.
    pub(crate) fn set_replica_id(&mut self, id: u64) {
        self.replica_id = Some(id);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(id) = self.replica_id {
            debug!("removing replica {} ({}) from registry", id, self.addr);
            self.state.replication.remove_replica(id);
        }
    }
}
