// src/core/handles.rs

//! Per-connection handle tables.
//!
//! Clients never see raw module handles. Each connection owns a `HandleMap`
//! that issues virtual handles and translates them back to the physical
//! handles held inside the security module.

use crate::core::errors::BrokerError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// The class of handle a table manages. The tag byte occupies the top 8 bits
/// of every virtual handle issued by a table of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Transient,
    Session,
}

impl HandleKind {
    const fn tag(self) -> u8 {
        match self {
            HandleKind::Transient => 0x80,
            HandleKind::Session => 0x02,
        }
    }
}

/// A handle as issued to a client. Opaque outside the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualHandle(u32);

impl VirtualHandle {
    pub fn raw(self) -> u32 {
        self.0
    }

    fn compose(kind: HandleKind, index: u32) -> Self {
        VirtualHandle(((kind.tag() as u32) << 24) | (index & 0x00ff_ffff))
    }

    fn kind_tag(self) -> u8 {
        (self.0 >> 24) as u8
    }

    fn index(self) -> u32 {
        self.0 & 0x00ff_ffff
    }
}

/// A physical handle inside the security module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(u32);

impl ModuleHandle {
    pub fn new(raw: u32) -> Self {
        ModuleHandle(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A capacity-bounded table mapping virtual handles to module handles.
///
/// Shared between the connection entity and the service code as an
/// `Arc<HandleMap>`; the table lives exactly as long as its connection.
#[derive(Debug)]
pub struct HandleMap {
    kind: HandleKind,
    max_entries: usize,
    entries: Mutex<HashMap<u32, ModuleHandle>>,
}

impl HandleMap {
    pub fn new(kind: HandleKind, max_entries: usize) -> Self {
        Self {
            kind,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Issues a virtual handle for a physical module handle, using the lowest
    /// free index. Fails when the table is at capacity.
    pub fn bind(&self, physical: ModuleHandle) -> Result<VirtualHandle, BrokerError> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries {
            return Err(BrokerError::HandleTableFull(self.max_entries));
        }
        let index = (0..self.max_entries as u32)
            .find(|i| !entries.contains_key(i))
            .ok_or(BrokerError::HandleTableFull(self.max_entries))?;
        entries.insert(index, physical);
        Ok(VirtualHandle::compose(self.kind, index))
    }

    /// Translates a virtual handle back to its physical module handle.
    pub fn translate(&self, virt: VirtualHandle) -> Result<ModuleHandle, BrokerError> {
        if virt.kind_tag() != self.kind.tag() {
            return Err(BrokerError::UnknownHandle(virt.raw()));
        }
        self.entries
            .lock()
            .get(&virt.index())
            .copied()
            .ok_or(BrokerError::UnknownHandle(virt.raw()))
    }

    /// Removes a virtual handle from the table, returning the physical handle
    /// it was bound to.
    pub fn release(&self, virt: VirtualHandle) -> Result<ModuleHandle, BrokerError> {
        if virt.kind_tag() != self.kind.tag() {
            return Err(BrokerError::UnknownHandle(virt.raw()));
        }
        self.entries
            .lock()
            .remove(&virt.index())
            .ok_or(BrokerError::UnknownHandle(virt.raw()))
    }
}
