// src/core/state/core.rs

//! Defines the central `BrokerState` struct, holding all shared broker-wide state.

use super::session::SessionMap;
use super::stats::StatsState;
use crate::config::Config;
use crate::core::BrokerError;
use crate::core::lifecycle::ConnectionManager;
use crate::core::module::{LoopbackModule, ModuleChannel};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The central struct holding all shared, broker-wide state.
/// This struct is wrapped in an `Arc` and passed to every task and session
/// handler, providing a single source of truth for the broker's configuration
/// and dynamic state.
pub struct BrokerState {
    /// The broker's runtime configuration. Fixed for the life of the process.
    pub config: Config,
    /// Owns the connection registry and drives all lifecycle transitions.
    pub manager: ConnectionManager,
    /// A map of all live sessions, keyed by connection id. Stores the kill
    /// switch for targeted session termination.
    pub sessions: SessionMap,
    /// The single channel to the security module. All exchanges are
    /// serialized through this mutex, mirroring the one physical channel.
    pub module: Arc<Mutex<Box<dyn ModuleChannel>>>,
    /// Holds all broker-wide statistics.
    pub stats: StatsState,
}

impl BrokerState {
    /// Initializes the entire broker state from the given configuration.
    /// This is the main factory function for creating the broker's shared context.
    pub fn initialize(config: Config) -> Result<Arc<Self>, BrokerError> {
        let manager = ConnectionManager::new(config.max_connections, config.handles.max_entries);

        Ok(Arc::new(Self {
            manager,
            sessions: Arc::new(DashMap::new()),
            module: Arc::new(Mutex::new(Box::new(LoopbackModule))),
            stats: StatsState::new(),
            config,
        }))
    }
}
