// src/core/pipe.rs

//! The descriptor-pair factory: creates the unidirectional pipes that client
//! channels are built from.

use crate::core::errors::BrokerError;
use bitflags::bitflags;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::unistd::pipe2;
use std::os::unix::io::{AsRawFd, BorrowedFd, OwnedFd};

bitflags! {
    /// Open flags honored when creating pipe descriptors. They are applied
    /// atomically at creation time via `pipe2`, so there is no window where a
    /// descriptor exists without them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PipeFlags: u32 {
        /// Close the descriptors automatically on `exec`.
        const CLOEXEC  = libc::O_CLOEXEC as u32;
        /// Open the descriptors in non-blocking mode.
        const NONBLOCK = libc::O_NONBLOCK as u32;
    }
}

impl PipeFlags {
    fn to_oflag(self) -> OFlag {
        OFlag::from_bits_truncate(self.bits() as i32)
    }
}

/// The four ends of a full-duplex channel between the broker and one client.
///
/// Writes to `broker_send` are read from `client_receive`, and writes to
/// `client_send` are read from `broker_receive`. Each end is owned and closed
/// on drop.
#[derive(Debug)]
pub struct DuplexPipes {
    pub broker_receive: OwnedFd,
    pub broker_send: OwnedFd,
    pub client_receive: OwnedFd,
    pub client_send: OwnedFd,
}

/// Creates a single unidirectional pipe, returned as `(read_end, write_end)`.
pub fn pair(flags: PipeFlags) -> Result<(OwnedFd, OwnedFd), BrokerError> {
    let (read_end, write_end) = pipe2(flags.to_oflag())?;
    Ok((read_end, write_end))
}

/// Creates two pipes arranged into a full-duplex broker/client channel.
///
/// If the second pipe cannot be created, the first pipe's descriptors are
/// closed before the error is returned, so a failure never leaks descriptors.
pub fn duplex(flags: PipeFlags) -> Result<DuplexPipes, BrokerError> {
    // Client-to-broker direction.
    let (broker_receive, client_send) = pair(flags)?;
    // Broker-to-client direction. On failure the first pair drops here.
    let (client_receive, broker_send) = pair(flags)?;

    Ok(DuplexPipes {
        broker_receive,
        broker_send,
        client_receive,
        client_send,
    })
}

/// Switches an already-open descriptor to non-blocking mode.
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<(), BrokerError> {
    let raw = fd.as_raw_fd();
    let current = fcntl(raw, FcntlArg::F_GETFL)?;
    let mut status = OFlag::from_bits_truncate(current);
    status.insert(OFlag::O_NONBLOCK);
    fcntl(raw, FcntlArg::F_SETFL(status))?;
    Ok(())
}
