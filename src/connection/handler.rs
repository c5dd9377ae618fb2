// src/connection/handler.rs

//! Defines the `SessionHandler` which services one client channel.

use super::guard::ConnectionGuard;
use crate::core::connection::Connection;
use crate::core::errors::BrokerError;
use crate::core::state::BrokerState;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Readiness wrapper for the broker's receive end of a connection.
struct ReceiveHalf(Arc<Connection>);

impl AsRawFd for ReceiveHalf {
    fn as_raw_fd(&self) -> RawFd {
        self.0.key_fd()
    }
}

/// Readiness wrapper for the broker's send end of a connection.
struct SendHalf(Arc<Connection>);

impl AsRawFd for SendHalf {
    fn as_raw_fd(&self) -> RawFd {
        self.0.send().as_raw_fd()
    }
}

/// Services one client channel: waits for readiness on the receive end,
/// relays each request through the module channel, and writes the response
/// back. Exits on client EOF, the session kill switch, or global shutdown.
pub struct SessionHandler {
    state: Arc<BrokerState>,
    connection: Arc<Connection>,
    kill_rx: broadcast::Receiver<()>,
    global_shutdown_rx: broadcast::Receiver<()>,
}

impl SessionHandler {
    /// Creates a new `SessionHandler`. The connection must already be
    /// registered and its broker-side ends switched to non-blocking mode.
    pub fn new(
        state: Arc<BrokerState>,
        connection: Arc<Connection>,
        kill_rx: broadcast::Receiver<()>,
        global_shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            state,
            connection,
            kill_rx,
            global_shutdown_rx,
        }
    }

    /// The main event loop for the session. The guard cleans up the session
    /// map entry and the connection on every exit path.
    pub async fn run(mut self, guard: ConnectionGuard) -> Result<(), BrokerError> {
        let session_id = self.connection.key_id();
        let receive = AsyncFd::with_interest(
            ReceiveHalf(self.connection.clone()),
            Interest::READABLE,
        )?;
        let send = AsyncFd::with_interest(SendHalf(self.connection.clone()), Interest::WRITABLE)?;
        let mut request = vec![0u8; self.state.config.request_buffer_bytes];

        loop {
            tokio::select! {
                // Prioritize shutdown signals over client I/O.
                biased;
                _ = self.global_shutdown_rx.recv() => {
                    info!("Session handler for {} received GLOBAL shutdown signal.", session_id);
                    break;
                }
                _ = self.kill_rx.recv() => {
                    info!("Session handler for {} received kill signal.", session_id);
                    break;
                }
                ready = receive.readable() => {
                    let mut ready = ready?;

                    // Readiness carries only a raw descriptor, so look the
                    // connection up again before touching it. A miss means it
                    // was closed while we were waiting.
                    if self
                        .state
                        .manager
                        .registry()
                        .find_by_fd(self.connection.key_fd())
                        .is_none()
                    {
                        debug!("Connection {} deregistered; session handler exiting.", session_id);
                        break;
                    }

                    match ready.try_io(|inner| read_request(inner.get_ref(), &mut request)) {
                        Ok(Ok(0)) => {
                            info!("Client on connection {} closed its channel.", session_id);
                            break;
                        }
                        Ok(Ok(n)) if n == request.len() => {
                            warn!(
                                "Request on connection {} exceeds the {} byte buffer.",
                                session_id,
                                request.len()
                            );
                            return Err(BrokerError::InvalidRequest(format!(
                                "request larger than {} bytes",
                                request.len()
                            )));
                        }
                        Ok(Ok(n)) => {
                            self.state.stats.increment_total_requests();
                            debug!("Session {}: relaying {} byte request.", session_id, n);
                            let response = {
                                let mut module = self.state.module.lock().await;
                                module.exchange(&request[..n]).await?
                            };
                            write_response(&send, &response).await?;
                        }
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_would_block) => continue,
                    }
                }
            }
        }

        drop(guard);
        Ok(())
    }
}

fn read_request(half: &ReceiveHalf, buf: &mut [u8]) -> std::io::Result<usize> {
    nix::unistd::read(half.0.key_fd(), buf).map_err(std::io::Error::from)
}

/// Writes the full response to the non-blocking send end, waiting for write
/// readiness whenever the pipe is full.
async fn write_response(send: &AsyncFd<SendHalf>, data: &[u8]) -> Result<(), BrokerError> {
    let mut written = 0;
    while written < data.len() {
        let mut ready = send.writable().await?;
        match ready.try_io(|inner| {
            nix::unistd::write(inner.get_ref().0.send(), &data[written..])
                .map_err(std::io::Error::from)
        }) {
            Ok(Ok(n)) => written += n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_would_block) => continue,
        }
    }
    Ok(())
}
