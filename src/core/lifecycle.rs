// src/core/lifecycle.rs

//! Connection lifecycle management: open, close, and shutdown.

use crate::core::connection::{ClientEndpoint, Connection};
use crate::core::errors::BrokerError;
use crate::core::handles::{HandleKind, HandleMap};
use crate::core::pipe::{self, PipeFlags};
use crate::core::registry::ConnectionRegistry;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Allocates connection ids. Ids start at 1 and are never reused; 0 is
/// reserved to mean "no connection" on the wire.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Returns a fresh id. Once the 64-bit space is spent this fails on every
    /// call; the counter never wraps back to already-issued ids.
    pub fn allocate(&self) -> Result<u64, BrokerError> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(1)
            })
            .map_err(|_| BrokerError::IdSpaceExhausted)
    }
}

/// The result of opening a connection: the broker's shared handle to the
/// registered entity plus the client-side descriptors for handoff.
#[derive(Debug)]
pub struct OpenedConnection {
    pub connection: Arc<Connection>,
    pub client: ClientEndpoint,
}

/// Owns the registry and drives connection open/close/shutdown transitions.
pub struct ConnectionManager {
    registry: Arc<ConnectionRegistry>,
    ids: IdAllocator,
    handle_capacity: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize, handle_capacity: usize) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(max_connections)),
            ids: IdAllocator::new(),
            handle_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn live_connections(&self) -> usize {
        self.registry.len()
    }

    /// Opens a new connection: allocates an id, builds the duplex channel and
    /// handle table, and registers the entity under both keys.
    ///
    /// `CLOEXEC` in `flags` applies to all four descriptors. `NONBLOCK`
    /// applies to the broker-side ends only; the client ends always use
    /// ordinary blocking I/O. If any step fails, every descriptor created so
    /// far is closed and the registry is left untouched.
    pub fn open(&self, flags: PipeFlags) -> Result<OpenedConnection, BrokerError> {
        let id = self.ids.allocate()?;
        let handle_map = Arc::new(HandleMap::new(HandleKind::Transient, self.handle_capacity));

        let (connection, client) =
            Connection::new(id, flags & !PipeFlags::NONBLOCK, handle_map)?;
        if flags.contains(PipeFlags::NONBLOCK) {
            pipe::set_nonblocking(connection.receive())?;
            pipe::set_nonblocking(connection.send())?;
        }

        let connection = Arc::new(connection);
        self.registry.insert(connection.clone())?;
        debug!(
            "Opened connection {} (receive fd {}).",
            id,
            connection.key_fd()
        );

        Ok(OpenedConnection { connection, client })
    }

    /// Closes the connection registered under `id`. The entry leaves both
    /// registry views immediately; the descriptors are closed as soon as the
    /// last holder lets go of the entity.
    pub fn close_by_id(&self, id: u64) -> Result<(), BrokerError> {
        let connection = self.registry.remove_by_id(id)?;
        self.finish_close(connection);
        Ok(())
    }

    /// Closes the connection registered under the receive descriptor `fd`.
    pub fn close_by_fd(&self, fd: RawFd) -> Result<(), BrokerError> {
        let connection = self.registry.remove_by_fd(fd)?;
        self.finish_close(connection);
        Ok(())
    }

    /// Closes every registered connection and empties the registry. Close
    /// errors on individual connections are logged, never propagated, and a
    /// second call finds nothing left to do. Returns how many connections
    /// were closed.
    pub fn shutdown(&self) -> usize {
        let drained = self.registry.drain();
        let count = drained.len();
        for connection in drained {
            self.finish_close(connection);
        }
        if count > 0 {
            info!("Closed {} connections on shutdown.", count);
        }
        count
    }

    /// Releases the manager's handle to an already-deregistered connection.
    /// When this is the last handle the descriptors are closed here, with
    /// errors logged. Otherwise the remaining holders close them on drop.
    fn finish_close(&self, connection: Arc<Connection>) {
        let id = connection.key_id();
        let fd = connection.key_fd();
        match Arc::try_unwrap(connection) {
            Ok(entity) => {
                if let Err(e) = entity.close() {
                    warn!("Failed to close descriptors for connection {}: {}", id, e);
                } else {
                    debug!("Closed connection {} (receive fd was {}).", id, fd);
                }
            }
            Err(_) => {
                debug!(
                    "Connection {} is still held elsewhere; descriptors close with the last holder.",
                    id
                );
            }
        }
    }
}
