// src/server/connection_loop.rs

//! The main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for a shutdown signal: SIGINT/SIGTERM on Unix, Ctrl+C on Windows.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    #[cfg(unix)]
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("failed to register Ctrl+C handler");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, shutting down."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, shutting down."); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, shutting down."); } } => {},
    }
}

/// The main server loop: accepts connections and spawns a handler task per
/// socket, until a shutdown signal arrives.
pub async fn run(ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => {
                break;
            }

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("accepted connection from {addr}");
                        let state = ctx.state.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();
                        client_tasks.spawn(async move {
                            let handler = ConnectionHandler::new(socket, addr, state, shutdown_rx);
                            if let Err(e) = handler.run().await {
                                warn!("connection from {addr} terminated: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {e}");
                    }
                }
            }

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("a client handler panicked: {e:?}");
                }
            }
        }
    }

    info!("shutting down: notifying all connections");
    let _ = ctx.shutdown_tx.send(());
    client_tasks.shutdown().await;
    info!("server shutdown complete");
}
