// src/core/registry.rs

//! The dual-keyed connection registry.
//!
//! Every live connection is discoverable by two keys: the raw value of its
//! receive descriptor (the I/O path) and its 64-bit id (the admin path). Both
//! key views are guarded by one lock, so no reader can ever observe a
//! connection present in one view and absent from the other.

use crate::core::connection::Connection;
use crate::core::errors::BrokerError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::Arc;

#[derive(Default)]
struct RegistryInner {
    by_fd: HashMap<RawFd, Arc<Connection>>,
    by_id: HashMap<u64, Arc<Connection>>,
}

/// A concurrency-safe store of live connections, keyed by descriptor and by id.
///
/// Lookups run concurrently under a read lock and hand out `Arc<Connection>`
/// clones. A held clone keeps the entity (and its descriptors) alive even if
/// the connection is removed from the registry in the meantime, so a removal
/// can never close descriptors out from under an in-flight operation.
///
/// Registries are always explicit instances owned by a
/// [`ConnectionManager`](crate::core::lifecycle::ConnectionManager); there is
/// no process-global registry.
pub struct ConnectionRegistry {
    max_connections: usize,
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Registers a connection under both of its keys in one critical section.
    ///
    /// Fails with `RegistryFull` at the capacity bound and with
    /// `DuplicateDescriptor`/`DuplicateId` if either key is already taken. A
    /// failed insert leaves both views untouched, including the entry the new
    /// connection collided with.
    pub fn insert(&self, connection: Arc<Connection>) -> Result<(), BrokerError> {
        let fd = connection.key_fd();
        let id = connection.key_id();

        let mut inner = self.inner.write();
        if inner.by_id.len() >= self.max_connections {
            return Err(BrokerError::RegistryFull(self.max_connections));
        }
        if inner.by_fd.contains_key(&fd) {
            return Err(BrokerError::DuplicateDescriptor(fd));
        }
        if inner.by_id.contains_key(&id) {
            return Err(BrokerError::DuplicateId(id));
        }
        inner.by_fd.insert(fd, connection.clone());
        inner.by_id.insert(id, connection);
        Ok(())
    }

    /// O(1) lookup by receive descriptor. `None` means the descriptor has no
    /// registered connection, which is a normal outcome, not an error.
    pub fn find_by_fd(&self, fd: RawFd) -> Option<Arc<Connection>> {
        self.inner.read().by_fd.get(&fd).cloned()
    }

    /// O(1) lookup by connection id.
    pub fn find_by_id(&self, id: u64) -> Option<Arc<Connection>> {
        self.inner.read().by_id.get(&id).cloned()
    }

    /// Removes a connection from both key views in one critical section and
    /// returns the registry's handle to it.
    pub fn remove_by_id(&self, id: u64) -> Result<Arc<Connection>, BrokerError> {
        let mut inner = self.inner.write();
        let connection = inner.by_id.remove(&id).ok_or(BrokerError::IdNotFound(id))?;
        let paired = inner.by_fd.remove(&connection.key_fd());
        debug_assert!(paired.is_some(), "descriptor view out of step with id view");
        Ok(connection)
    }

    /// Removes a connection from both key views in one critical section,
    /// addressed by its receive descriptor.
    pub fn remove_by_fd(&self, fd: RawFd) -> Result<Arc<Connection>, BrokerError> {
        let mut inner = self.inner.write();
        let connection = inner
            .by_fd
            .remove(&fd)
            .ok_or(BrokerError::DescriptorNotFound(fd))?;
        let paired = inner.by_id.remove(&connection.key_id());
        debug_assert!(paired.is_some(), "id view out of step with descriptor view");
        Ok(connection)
    }

    /// Removes the given connection, addressed by its id key.
    pub fn remove(&self, connection: &Connection) -> Result<Arc<Connection>, BrokerError> {
        self.remove_by_id(connection.key_id())
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }

    /// A consistent point-in-time view of all live connections.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.read().by_id.values().cloned().collect()
    }

    /// Atomically empties both key views and returns every connection that was
    /// registered. Used by shutdown so each entry is taken exactly once.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let mut inner = self.inner.write();
        inner.by_fd.clear();
        inner.by_id.drain().map(|(_, conn)| conn).collect()
    }
}
