// src/main.rs

//! The main entry point for the SpinelDB server application.

use anyhow::Result;
use spineldb::config::Config;
use spineldb::server;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .compact()
        .with_ansi(true)
        .init();

    let config = match Config::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run(config).await {
        error!("server runtime error: {e}");
        return Err(e);
    }
    Ok(())
}
