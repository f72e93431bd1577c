// src/core/replication/mod.rs

//! Replication has two faces: the leader side, which is just a handful of
//! handshake replies issued from the connection handler plus the replica
//! registry (`crate::core::state::ReplicationState`); and the follower side,
//! a dedicated background task that performs the handshake against a leader
//! and then continuously ingests propagated commands.

pub mod follower;
pub mod leader;

use crate::config::ReplicationConfig;
use crate::core::state::ServerState;
use std::sync::Arc;
use tracing::info;

/// Spawns the follower replication client when configured with `--replicaof`.
/// A leader needs no dedicated task: its side of replication is driven
/// entirely by inbound client connections (`PSYNC`, `REPLCONF ACK`).
pub fn spawn_if_follower(state: Arc<ServerState>) {
    if let ReplicationConfig::Follower { host, port } = state.config.replication.clone() {
        let own_port = state.config.port;
        info!("starting replication worker against {host}:{port}");
        tokio::spawn(async move {
            follower::run(state, host, port, own_port).await;
        });
    }
}
