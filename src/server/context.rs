// src/server/context.rs

//! Bundles the pieces `initialization::setup` produces for `connection_loop::run`.

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub listener: TcpListener,
    /// Broadcast so every live connection task hears the shutdown signal at once.
    pub shutdown_tx: broadcast::Sender<()>,
}
