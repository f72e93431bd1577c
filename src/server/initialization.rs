// src/server/initialization.rs

//! Handles the complete server initialization process: state construction,
//! RDB loading, starting the follower task, and binding the listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::persistence::RdbLoader;
use crate::core::replication;
use crate::core::state::ServerState;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    info!(
        "starting SpinelDB on port {} (role: {})",
        config.port,
        if config.replication.is_follower() {
            "follower"
        } else {
            "leader"
        }
    );

    let state = Arc::new(ServerState::new(config));

    let loaded = RdbLoader::load(&state.config.rdb_path()).await;
    for entry in loaded {
        state
            .string_store
            .load(entry.key, entry.value, entry.expires_at);
    }

    replication::spawn_if_follower(state.clone());

    let listener = TcpListener::bind(("0.0.0.0", state.config.port)).await?;
    info!("listening on 0.0.0.0:{}", state.config.port);

    let (shutdown_tx, _) = broadcast::channel(1);

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
    })
}
