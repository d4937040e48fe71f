//! Mailbox between the transport and the server worker.
//!
//! Uses `embassy-sync` bounded channels so the transport side (async I/O,
//! interrupt-driven receive, or a test) and the single worker that owns
//! the server never share anything but these queues.
//!
//! ```text
//! ┌──────────────┐  CommandMsg    ┌──────────────┐
//! │  Transport   │──────────────▶│    Worker     │
//! │              │  DisconnectMsg │  (DceServer)  │
//! │              │──────────────▶│               │
//! │              │◀──────────────│               │
//! └──────────────┘  ResponseMsg   └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

use crate::handle::ConnectionId;

use super::codec::{FrameDecoder, MAX_FRAME_SIZE, MAX_WIRE_SIZE};

/// Inbound request from a client, delivered to the worker.
pub struct CommandMsg {
    pub connection: ConnectionId,
    /// Request payload, length prefix already stripped.
    pub frame: Vec<u8, MAX_FRAME_SIZE>,
}

/// Outbound response from the worker, delivered to the transport.
pub struct ResponseMsg {
    pub connection: ConnectionId,
    /// Length-prefix-encoded response bytes (ready to write to transport).
    pub data: Vec<u8, MAX_WIRE_SIZE>,
}

/// A connection has gone away; its resources must be swept.
pub struct DisconnectMsg {
    pub connection: ConnectionId,
}

const CMD_DEPTH: usize = 4;
const RESP_DEPTH: usize = 4;
const DISCONNECT_DEPTH: usize = 8;

pub struct Mailbox {
    pub(super) commands: Channel<CriticalSectionRawMutex, CommandMsg, CMD_DEPTH>,
    pub(super) responses: Channel<CriticalSectionRawMutex, ResponseMsg, RESP_DEPTH>,
    pub(super) disconnects: Channel<CriticalSectionRawMutex, DisconnectMsg, DISCONNECT_DEPTH>,
}

impl Mailbox {
    /// `const` so a mailbox can live in a `static`.
    pub const fn new() -> Self {
        Self {
            commands: Channel::new(),
            responses: Channel::new(),
            disconnects: Channel::new(),
        }
    }

    /// Queue one request payload. Returns false if it was dropped.
    pub fn submit(&self, connection: ConnectionId, payload: &[u8]) -> bool {
        let mut frame = Vec::new();
        if frame.extend_from_slice(payload).is_err() {
            warn!("IO[{}]: request too large for command buffer", connection);
            return false;
        }
        if self.commands.try_send(CommandMsg { connection, frame }).is_err() {
            warn!("IO[{}]: command channel full, dropping request", connection);
            return false;
        }
        true
    }

    /// Run transport bytes through `decoder` and queue every request they
    /// complete. Returns how many were queued.
    pub fn feed(&self, decoder: &mut FrameDecoder, connection: ConnectionId, data: &[u8]) -> usize {
        let mut queued = 0;
        decoder.push(data, |payload| {
            if self.submit(connection, payload) {
                queued += 1;
            }
        });
        queued
    }

    pub fn notify_disconnect(&self, connection: ConnectionId) -> bool {
        if self.disconnects.try_send(DisconnectMsg { connection }).is_err() {
            warn!("IO[{}]: disconnect channel full", connection);
            return false;
        }
        true
    }

    pub fn try_response(&self) -> Option<ResponseMsg> {
        self.responses.try_receive().ok()
    }

    /// Wait for the next response.
    pub async fn response(&self) -> ResponseMsg {
        self.responses.receive().await
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
