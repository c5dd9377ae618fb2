// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for session resource management.

use crate::core::BrokerError;
use crate::core::state::BrokerState;
use std::sync::Arc;
use tracing::{debug, warn};

/// An RAII guard to ensure session resources are always cleaned up when a
/// session handler's scope is exited, whatever the exit path was.
pub struct ConnectionGuard {
    /// A shared reference to the broker state.
    pub(crate) state: Arc<BrokerState>,
    /// The unique identifier of the session's connection.
    pub(crate) session_id: u64,
}

impl ConnectionGuard {
    /// Creates a new `ConnectionGuard`.
    pub(crate) fn new(state: Arc<BrokerState>, session_id: u64) -> Self {
        Self { state, session_id }
    }
}

impl Drop for ConnectionGuard {
    /// Performs resource cleanup when the guard goes out of scope.
    /// This removes the session's kill switch and closes its connection.
    fn drop(&mut self) {
        debug!(
            "ConnectionGuard dropping, cleaning up resources for session {}",
            self.session_id
        );

        // Remove the session from the central session map.
        if self.state.sessions.remove(&self.session_id).is_none() {
            debug!(
                "Session {} was not in the session map upon cleanup.",
                self.session_id
            );
        }

        // Deregister and close the connection. An id miss here just means an
        // admin request closed it first.
        match self.state.manager.close_by_id(self.session_id) {
            Ok(()) => {}
            Err(BrokerError::IdNotFound(_)) => {
                debug!(
                    "Connection {} was already closed upon cleanup.",
                    self.session_id
                );
            }
            Err(e) => {
                warn!(
                    "Failed to close connection {} during cleanup: {}",
                    self.session_id, e
                );
            }
        }
    }
}
