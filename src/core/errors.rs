// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::os::unix::io::RawFd;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the broker.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection identifier space exhausted")]
    IdSpaceExhausted,

    #[error("Connection registry is full ({0} connections)")]
    RegistryFull(usize),

    #[error("Descriptor {0} is already registered")]
    DuplicateDescriptor(RawFd),

    #[error("Connection id {0} is already registered")]
    DuplicateId(u64),

    #[error("No registered connection for descriptor {0}")]
    DescriptorNotFound(RawFd),

    #[error("No registered connection for id {0}")]
    IdNotFound(u64),

    #[error("Handle table is full ({0} entries)")]
    HandleTableFull(usize),

    #[error("Unknown virtual handle {0:#010x}")]
    UnknownHandle(u32),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Module channel error: {0}")]
    Module(String),

    #[error("Internal Broker Error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Returns true for failures caused by an exhausted environmental resource,
    /// such as the process descriptor table, the id space, or a capacity bound.
    /// These are operational conditions, not bugs.
    pub fn is_resource_exhaustion(&self) -> bool {
        match self {
            BrokerError::Io(e) => matches!(
                e.raw_os_error(),
                Some(code) if code == libc::EMFILE || code == libc::ENFILE
            ),
            BrokerError::IdSpaceExhausted
            | BrokerError::RegistryFull(_)
            | BrokerError::HandleTableFull(_) => true,
            _ => false,
        }
    }

    /// Returns true for failures that indicate a broken internal invariant or
    /// misuse of the API, such as duplicate keys or transitions on unknown entries.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            BrokerError::DuplicateDescriptor(_)
                | BrokerError::DuplicateId(_)
                | BrokerError::DescriptorNotFound(_)
                | BrokerError::IdNotFound(_)
                | BrokerError::UnknownHandle(_)
        )
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for BrokerError {
    fn clone(&self) -> Self {
        match self {
            BrokerError::Io(e) => BrokerError::Io(Arc::clone(e)),
            BrokerError::IdSpaceExhausted => BrokerError::IdSpaceExhausted,
            BrokerError::RegistryFull(n) => BrokerError::RegistryFull(*n),
            BrokerError::DuplicateDescriptor(fd) => BrokerError::DuplicateDescriptor(*fd),
            BrokerError::DuplicateId(id) => BrokerError::DuplicateId(*id),
            BrokerError::DescriptorNotFound(fd) => BrokerError::DescriptorNotFound(*fd),
            BrokerError::IdNotFound(id) => BrokerError::IdNotFound(*id),
            BrokerError::HandleTableFull(n) => BrokerError::HandleTableFull(*n),
            BrokerError::UnknownHandle(h) => BrokerError::UnknownHandle(*h),
            BrokerError::InvalidRequest(s) => BrokerError::InvalidRequest(s.clone()),
            BrokerError::Module(s) => BrokerError::Module(s.clone()),
            BrokerError::Internal(s) => BrokerError::Internal(s.clone()),
        }
    }
}

impl PartialEq for BrokerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BrokerError::Io(e1), BrokerError::Io(e2)) => e1.to_string() == e2.to_string(),
            (BrokerError::RegistryFull(n1), BrokerError::RegistryFull(n2)) => n1 == n2,
            (BrokerError::DuplicateDescriptor(f1), BrokerError::DuplicateDescriptor(f2)) => {
                f1 == f2
            }
            (BrokerError::DuplicateId(i1), BrokerError::DuplicateId(i2)) => i1 == i2,
            (BrokerError::DescriptorNotFound(f1), BrokerError::DescriptorNotFound(f2)) => f1 == f2,
            (BrokerError::IdNotFound(i1), BrokerError::IdNotFound(i2)) => i1 == i2,
            (BrokerError::HandleTableFull(n1), BrokerError::HandleTableFull(n2)) => n1 == n2,
            (BrokerError::UnknownHandle(h1), BrokerError::UnknownHandle(h2)) => h1 == h2,
            (BrokerError::InvalidRequest(s1), BrokerError::InvalidRequest(s2)) => s1 == s2,
            (BrokerError::Module(s1), BrokerError::Module(s2)) => s1 == s2,
            (BrokerError::Internal(s1), BrokerError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Io(Arc::new(e))
    }
}

impl From<nix::errno::Errno> for BrokerError {
    fn from(e: nix::errno::Errno) -> Self {
        BrokerError::Io(Arc::new(std::io::Error::from(e)))
    }
}
