// src/server/context.rs

use crate::core::state::BrokerState;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::broadcast;

/// Holds all the initialized state required to run the broker's accept loop.
pub struct ServerContext {
    pub state: Arc<BrokerState>,
    pub listener: UnixListener,
    pub shutdown_tx: broadcast::Sender<()>,
}
