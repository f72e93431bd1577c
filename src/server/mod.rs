// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    let ctx = initialization::setup(config).await?;
    connection_loop::run(ctx).await;
    Ok(())
}
