//! The single context that owns the server.
//!
//! Every request and every disconnect sweep runs here, one at a time, so
//! no handler can observe a half-swept client. Pending disconnects always
//! go first:
//!
//! ```text
//!   disconnects ──┐
//!                 ├──▶ Worker ──▶ DceServer ──▶ responses
//!   commands ─────┘   (drain disconnects before each command)
//! ```

use futures_lite::future;
use log::{error, warn};

use crate::app::ports::Ports;
use crate::error::Result;
use crate::handle::ConnectionId;

use super::channels::{CommandMsg, DisconnectMsg, Mailbox, ResponseMsg};
use super::codec::encode_frame;
use super::server::DceServer;

enum Event {
    Disconnect(DisconnectMsg),
    Command(CommandMsg),
}

pub struct Worker<'m> {
    server: DceServer,
    mailbox: &'m Mailbox,
}

impl<'m> Worker<'m> {
    pub fn new(server: DceServer, mailbox: &'m Mailbox) -> Self {
        Self { server, mailbox }
    }

    pub fn server(&self) -> &DceServer {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut DceServer {
        &mut self.server
    }

    /// Sweep every pending disconnect, then serve at most one command.
    /// Returns whether a command was served. Only a fatal sweep failure is
    /// an error.
    pub fn pump(&mut self, ports: &mut Ports<'_>) -> Result<bool> {
        self.drain_disconnects(ports)?;
        let Ok(command) = self.mailbox.commands.try_receive() else {
            return Ok(false);
        };
        if let Some(reply) = self.serve(command, ports) {
            let connection = reply.connection;
            if self.mailbox.responses.try_send(reply).is_err() {
                warn!("WORKER: response channel full, dropping reply to {}", connection);
            }
        }
        Ok(true)
    }

    /// Serve the mailbox until a sweep fails fatally. Replies wait for
    /// room in the response channel; none is dropped.
    pub async fn run(&mut self, ports: &mut Ports<'_>) -> Result<()> {
        let mailbox = self.mailbox;
        loop {
            let event = future::or(
                async { Event::Disconnect(mailbox.disconnects.receive().await) },
                async { Event::Command(mailbox.commands.receive().await) },
            )
            .await;

            match event {
                Event::Disconnect(msg) => self.sweep(msg.connection, ports)?,
                Event::Command(command) => {
                    self.drain_disconnects(ports)?;
                    if let Some(reply) = self.serve(command, ports) {
                        mailbox.responses.send(reply).await;
                    }
                }
            }
        }
    }

    fn drain_disconnects(&mut self, ports: &mut Ports<'_>) -> Result<()> {
        while let Ok(msg) = self.mailbox.disconnects.try_receive() {
            self.sweep(msg.connection, ports)?;
        }
        Ok(())
    }

    fn sweep(&mut self, connection: ConnectionId, ports: &mut Ports<'_>) -> Result<()> {
        match self.server.on_disconnect(connection, ports) {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => {
                error!("WORKER: sweep of {} failed fatally: {}", connection, e);
                Err(e)
            }
            Err(e) => {
                warn!("WORKER: sweep of {} failed: {}", connection, e);
                Ok(())
            }
        }
    }

    fn serve(&mut self, command: CommandMsg, ports: &mut Ports<'_>) -> Option<ResponseMsg> {
        let connection = command.connection;
        let payload = match self.server.dispatch_frame(connection, &command.frame, ports) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("WORKER: dropping request from {}: {}", connection, e);
                return None;
            }
        };
        match encode_frame(&payload) {
            Ok(data) => Some(ResponseMsg { connection, data }),
            Err(e) => {
                warn!("WORKER: response to {} not framed: {}", connection, e);
                None
            }
        }
    }
}
