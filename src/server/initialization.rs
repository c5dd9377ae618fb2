// src/server/initialization.rs

//! Handles the complete broker initialization process, from state setup to
//! binding the control socket.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::BrokerState;
use anyhow::{Result, anyhow};
use std::path::Path;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Initializes all broker components before starting the accept loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = BrokerState::initialize(config.clone())?;
    info!("Broker state initialized.");

    prepare_socket_path(&config.socket_path).await?;
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| anyhow!("Failed to bind control socket '{}': {}", config.socket_path, e))?;
    info!("secmux listening on {}", config.socket_path);

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
    })
}

/// Makes sure the control socket path is bindable: the parent directory
/// exists and no stale socket file from a previous run is in the way.
async fn prepare_socket_path(socket_path: &str) -> Result<()> {
    let path = Path::new(socket_path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            anyhow!(
                "Failed to create socket directory '{}': {}",
                parent.display(),
                e
            )
        })?;
        info!("Created socket directory: {}", parent.display());
    }

    if path.exists() {
        warn!(
            "Removing stale socket file '{}' from a previous run.",
            path.display()
        );
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| anyhow!("Failed to remove stale socket '{}': {}", path.display(), e))?;
    }
    Ok(())
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Broker configured for up to {} concurrent connections.",
        config.max_connections
    );
    info!(
        "Per-connection handle tables hold up to {} entries.",
        config.handles.max_entries
    );
}
