// src/server/control.rs

//! The control protocol spoken on the broker's Unix socket.
//!
//! Each accepted control stream carries exactly one length-delimited request.
//! `NewSession` replies with the connection id and then passes the two
//! client-side descriptors over the socket as `SCM_RIGHTS` ancillary data;
//! the stream's task then becomes the session's service task. Admin requests
//! reply inline and the stream is dropped.

use crate::connection::{ConnectionGuard, SessionHandler};
use crate::core::errors::BrokerError;
use crate::core::lifecycle::OpenedConnection;
use crate::core::pipe::PipeFlags;
use crate::core::state::BrokerState;
use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use nix::sys::socket::{ControlMessage, MsgFlags, UnixAddr, sendmsg};
use std::fmt::Write as _;
use std::io::IoSlice;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use tokio::io::Interest;
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{info, warn};

/// Upper bound on a control frame body. Control requests are tiny; anything
/// bigger is a confused or hostile client.
pub const MAX_CONTROL_FRAME: usize = 16 * 1024;

/// The single data byte sent alongside the `SCM_RIGHTS` ancillary payload.
/// Ancillary data cannot travel on an empty message.
pub const FD_HANDOFF_MARKER: u8 = 0xFD;

const OP_NEW_SESSION: u8 = 0x01;
const OP_LIST: u8 = 0x02;
const OP_KILL: u8 = 0x03;
const OP_STATS: u8 = 0x04;

const STATUS_OK: u8 = 0x00;
const STATUS_ERR: u8 = 0x01;

/// A request read from a control client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Open a connection and hand its client descriptors to the caller.
    NewSession,
    /// Render one line per live connection.
    List,
    /// Terminate the session with the given connection id.
    Kill { id: u64 },
    /// Report broker counters.
    Stats,
}

/// A reply written to a control client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    /// `NewSession` succeeded; the descriptors follow out-of-band.
    Session { id: u64 },
    Listing(String),
    Killed,
    Stats {
        live: u64,
        total_sessions: u64,
        total_requests: u64,
    },
    Error(String),
}

/// Frames the control protocol: a `u32` big-endian body length, then an
/// opcode byte and its fixed-width arguments.
pub struct ControlCodec;

impl Decoder for ControlCodec {
    type Item = ControlRequest;
    type Error = BrokerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ControlRequest>, BrokerError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len == 0 || len > MAX_CONTROL_FRAME {
            return Err(BrokerError::InvalidRequest(format!(
                "control frame length {len} out of range"
            )));
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let mut body = src.split_to(len);

        let opcode = body.get_u8();
        let request = match opcode {
            OP_NEW_SESSION => ControlRequest::NewSession,
            OP_LIST => ControlRequest::List,
            OP_KILL => {
                if body.remaining() != 8 {
                    return Err(BrokerError::InvalidRequest(
                        "kill request must carry an 8 byte id".to_string(),
                    ));
                }
                ControlRequest::Kill { id: body.get_u64() }
            }
            OP_STATS => ControlRequest::Stats,
            other => {
                return Err(BrokerError::InvalidRequest(format!(
                    "unknown control opcode {other:#04x}"
                )));
            }
        };
        if body.has_remaining() {
            return Err(BrokerError::InvalidRequest(format!(
                "trailing bytes after control opcode {opcode:#04x}"
            )));
        }
        Ok(Some(request))
    }
}

impl Encoder<ControlResponse> for ControlCodec {
    type Error = BrokerError;

    fn encode(&mut self, response: ControlResponse, dst: &mut BytesMut) -> Result<(), BrokerError> {
        let mut body = BytesMut::new();
        match response {
            ControlResponse::Session { id } => {
                body.put_u8(STATUS_OK);
                body.put_u64(id);
            }
            ControlResponse::Listing(text) => {
                body.put_u8(STATUS_OK);
                body.put_slice(text.as_bytes());
            }
            ControlResponse::Killed => {
                body.put_u8(STATUS_OK);
            }
            ControlResponse::Stats {
                live,
                total_sessions,
                total_requests,
            } => {
                body.put_u8(STATUS_OK);
                body.put_u64(live);
                body.put_u64(total_sessions);
                body.put_u64(total_requests);
            }
            ControlResponse::Error(message) => {
                body.put_u8(STATUS_ERR);
                body.put_slice(message.as_bytes());
            }
        }
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

/// Serves one accepted control stream: reads a single request and dispatches
/// it. For `NewSession` the call only returns once the session ends.
pub async fn serve(
    stream: UnixStream,
    state: Arc<BrokerState>,
    mut global_shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BrokerError> {
    let mut framed = Framed::new(stream, ControlCodec);

    let request = tokio::select! {
        biased;
        _ = global_shutdown_rx.recv() => return Ok(()),
        request = framed.next() => match request {
            Some(request) => request?,
            // Client connected and went away without sending anything.
            None => return Ok(()),
        },
    };

    match request {
        ControlRequest::NewSession => {
            new_session(framed, state, global_shutdown_rx).await
        }
        ControlRequest::List => {
            let listing = render_listing(&state);
            framed.send(ControlResponse::Listing(listing)).await
        }
        ControlRequest::Kill { id } => {
            let response = kill_session(&state, id);
            framed.send(response).await
        }
        ControlRequest::Stats => {
            let response = ControlResponse::Stats {
                live: state.manager.live_connections() as u64,
                total_sessions: state.stats.get_total_sessions(),
                total_requests: state.stats.get_total_requests(),
            };
            framed.send(response).await
        }
    }
}

/// Opens a connection for the control client, hands off the client-side
/// descriptors, and then runs the session's service loop on this task.
async fn new_session(
    mut framed: Framed<UnixStream, ControlCodec>,
    state: Arc<BrokerState>,
    global_shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BrokerError> {
    let opened = match state.manager.open(PipeFlags::CLOEXEC | PipeFlags::NONBLOCK) {
        Ok(opened) => opened,
        Err(e) => {
            warn!("Failed to open a connection for a control client: {}", e);
            framed.send(ControlResponse::Error(e.to_string())).await?;
            return Ok(());
        }
    };
    let OpenedConnection { connection, client } = opened;
    let id = connection.key_id();

    let (kill_tx, kill_rx) = broadcast::channel(1);
    state.sessions.insert(id, kill_tx);
    state.stats.increment_total_sessions();
    // From here on the guard owns cleanup: session map entry and connection.
    let guard = ConnectionGuard::new(state.clone(), id);

    framed.send(ControlResponse::Session { id }).await?;
    let stream = framed.into_inner();
    send_client_fds(
        &stream,
        &[client.receive_fd.as_raw_fd(), client.send_fd.as_raw_fd()],
    )
    .await?;
    // The client process now holds its own copies of both descriptors.
    drop(stream);
    drop(client);
    info!("Session {} established, descriptors handed off.", id);

    let handler = SessionHandler::new(state, connection, kill_rx, global_shutdown_rx);
    handler.run(guard).await
}

/// Terminates a session by id: fires its kill switch and deregisters the
/// connection so descriptor-readiness lookups miss immediately.
fn kill_session(state: &BrokerState, id: u64) -> ControlResponse {
    match state.manager.registry().find_by_id(id) {
        Some(_) => {
            if let Some(entry) = state.sessions.get(&id) {
                let _ = entry.value().send(());
            }
            match state.manager.close_by_id(id) {
                // An id miss here means the handler exited in between; the
                // session is gone either way.
                Ok(()) | Err(BrokerError::IdNotFound(_)) => {
                    info!("Session {} terminated by control request.", id);
                    ControlResponse::Killed
                }
                Err(e) => ControlResponse::Error(e.to_string()),
            }
        }
        None => ControlResponse::Error(format!("no connection with id {id}")),
    }
}

/// One text line per live connection, in the same spirit as the logs.
fn render_listing(state: &BrokerState) -> String {
    let mut out = String::new();
    for connection in state.manager.registry().snapshot() {
        let _ = writeln!(
            out,
            "id={} fd={} age={}s handles={}",
            connection.key_id(),
            connection.key_fd(),
            connection.age().as_secs(),
            connection.handle_map().len()
        );
    }
    out
}

/// Sends raw descriptors over the control stream as `SCM_RIGHTS` ancillary
/// data, attached to a single marker byte.
async fn send_client_fds(stream: &UnixStream, fds: &[RawFd]) -> Result<(), BrokerError> {
    loop {
        stream.writable().await?;
        let result = stream.try_io(Interest::WRITABLE, || {
            let marker = [FD_HANDOFF_MARKER];
            let iov = [IoSlice::new(&marker)];
            let cmsgs = [ControlMessage::ScmRights(fds)];
            sendmsg::<UnixAddr>(
                stream.as_raw_fd(),
                &iov,
                &cmsgs,
                MsgFlags::empty(),
                None,
            )
            .map_err(std::io::Error::from)
        });
        match result {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
