// src/server/connection_loop.rs

//! Contains the main accept loop for control clients and the graceful
//! shutdown sequence.

use super::context::ServerContext;
use super::control;
use anyhow::anyhow;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// The main loop that accepts control connections and handles graceful shutdown.
pub async fn run(ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();

    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))
        .expect("Failed to create SIGINT stream");
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))
        .expect("Failed to create SIGTERM stream");

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            res = ctx.listener.accept() => {
                match res {
                    Ok((stream, _addr)) => {
                        match stream.peer_cred() {
                            Ok(cred) => info!(
                                "Accepted control connection from pid={:?} uid={}.",
                                cred.pid(),
                                cred.uid()
                            ),
                            Err(e) => warn!("Accepted control connection with unreadable peer credentials: {}", e),
                        }

                        let state_clone = ctx.state.clone();
                        let global_shutdown_rx = ctx.shutdown_tx.subscribe();
                        client_tasks.spawn(async move {
                            if let Err(e) = control::serve(stream, state_clone, global_shutdown_rx).await {
                                warn!("Control connection terminated unexpectedly: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept control connection: {}", e);
                    }
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A session task panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        // No receivers only means there were no live session tasks.
        info!("No active sessions to signal.");
    }

    client_tasks.shutdown().await;
    info!("All session tasks stopped.");

    let closed = ctx.state.manager.shutdown();
    if closed > 0 {
        info!("Reclaimed descriptors for {} leftover connections.", closed);
    }

    let socket_path = ctx.state.config.socket_path.clone();
    if let Err(e) = tokio::fs::remove_file(&socket_path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove control socket '{}': {}", socket_path, e);
    }

    info!("Server shutdown complete.");
}
