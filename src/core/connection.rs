// src/core/connection.rs

//! The connection entity: the broker-side ends of one client channel plus the
//! identity and handle table attached to it.

use crate::core::errors::BrokerError;
use crate::core::handles::HandleMap;
use crate::core::pipe::{self, PipeFlags};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The client-side ends of a channel, produced at connection setup and handed
/// off to the client process. The broker drops its copies after the handoff.
#[derive(Debug)]
pub struct ClientEndpoint {
    pub receive_fd: OwnedFd,
    pub send_fd: OwnedFd,
}

/// One registered client connection.
///
/// The entity owns its two descriptors. They are closed exactly once: either
/// through an explicit [`Connection::close`] or when the last shared handle to
/// the entity is dropped. The raw value of the receive descriptor and the
/// 64-bit id are the two registry keys.
#[derive(Debug)]
pub struct Connection {
    /// The broker reads client requests from this end.
    receive_fd: OwnedFd,
    /// The broker writes responses to this end.
    send_fd: OwnedFd,
    /// Unique for the lifetime of the broker instance, never reused.
    id: u64,
    handle_map: Arc<HandleMap>,
    created: Instant,
}

impl Connection {
    /// Builds a full-duplex channel and wraps the broker-side ends in a new
    /// entity. The client-side ends are returned for handoff. On failure every
    /// descriptor created so far is closed and nothing is leaked.
    pub fn new(
        id: u64,
        flags: PipeFlags,
        handle_map: Arc<HandleMap>,
    ) -> Result<(Self, ClientEndpoint), BrokerError> {
        let pipes = pipe::duplex(flags)?;
        let connection = Self {
            receive_fd: pipes.broker_receive,
            send_fd: pipes.broker_send,
            id,
            handle_map,
            created: Instant::now(),
        };
        let endpoint = ClientEndpoint {
            receive_fd: pipes.client_receive,
            send_fd: pipes.client_send,
        };
        Ok((connection, endpoint))
    }

    /// The descriptor key: the raw value of the broker's receive end.
    pub fn key_fd(&self) -> RawFd {
        self.receive_fd.as_raw_fd()
    }

    /// The id key.
    pub fn key_id(&self) -> u64 {
        self.id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Borrows the broker's receive end for I/O.
    pub fn receive(&self) -> BorrowedFd<'_> {
        self.receive_fd.as_fd()
    }

    /// Borrows the broker's send end for I/O.
    pub fn send(&self) -> BorrowedFd<'_> {
        self.send_fd.as_fd()
    }

    pub fn handle_map(&self) -> &Arc<HandleMap> {
        &self.handle_map
    }

    /// Time elapsed since the connection was created.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Explicitly closes both descriptors, reporting the first OS error.
    /// Both ends are closed even if closing the first one fails. Dropping the
    /// entity instead closes both silently.
    pub fn close(self) -> Result<(), BrokerError> {
        let Connection {
            receive_fd,
            send_fd,
            ..
        } = self;
        let first = nix::unistd::close(receive_fd.into_raw_fd());
        let second = nix::unistd::close(send_fd.into_raw_fd());
        first?;
        second?;
        Ok(())
    }
}

// Two handles refer to the same connection exactly when their id keys match.
impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}
