// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod control;
mod initialization;

pub use control::{
    ControlCodec, ControlRequest, ControlResponse, FD_HANDOFF_MARKER, MAX_CONTROL_FRAME,
};

/// The main broker startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize broker state and bind the control socket.
    let server_context = initialization::setup(config).await?;

    // 2. Start the accept loop. This function runs until shutdown.
    connection_loop::run(server_context).await;

    Ok(())
}
