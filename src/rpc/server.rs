//! Codec engine server: dispatches requests to the operation handlers.
//!
//! **Transport-decoupled**: the server owns no connection. Callers feed
//! `(connection, frame_bytes)` through [`DceServer::dispatch_frame`] and
//! get the encoded response back. Teardown of a connection arrives through
//! [`DceServer::on_disconnect`], which runs the sweeper.
//!
//! Every request passes through the same pipeline:
//!
//! 1. **Bind** checks arity and parameter shapes against the signature
//!    table. Nothing has happened yet if this fails.
//! 2. **Handler** runs the operation under a coherency gate, rolling back
//!    partial effects on failure.
//! 3. **Encode** turns the reply (or the error) into a response payload.

use log::{info, warn};

use crate::app::ports::{AcceleratorPort, Ports};
use crate::codec::{CapabilityTable, STATUS_FAIL, STATUS_OK};
use crate::config::ServerConfig;
use crate::error::{DceError, Result, WireError};
use crate::handle::ConnectionId;
use crate::registry::{Registry, RegistryStats};

use super::message::{InlineReturn, Request, Response};
use super::signature::{Call, OpCode, bind};
use super::sweeper::{self, SweepReport};

/// What a handler produced: a value or status, plus rewritten inline args.
#[derive(Debug, Default)]
pub(super) struct Reply {
    pub result: i32,
    /// Set when the operation ran but reported failure; the inline
    /// arguments still go back to the client.
    pub error: Option<DceError>,
    pub inline: Vec<InlineReturn>,
}

impl Reply {
    pub fn value(result: i32) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    /// Codec status passed through verbatim; non-zero marks a failure.
    pub fn status(code: i32) -> Self {
        Self {
            result: code,
            error: (code != STATUS_OK).then_some(DceError::HardwareOperationFailed(code)),
            inline: Vec::new(),
        }
    }

    fn into_response(self, op: OpCode) -> Response {
        Response {
            op,
            result: self.result,
            error: self.error.map_or(0, DceError::code),
            inline: self.inline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Suspend,
    Resume,
}

pub struct DceServer {
    pub(super) config: ServerConfig,
    pub(super) registry: Registry,
    pub(super) codecs: CapabilityTable,
    power_hooks: bool,
    suspended: bool,
}

impl DceServer {
    pub fn new(config: ServerConfig, codecs: CapabilityTable) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Registry::new(&config),
            config,
            codecs,
            power_hooks: false,
            suspended: false,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Bring the accelerator up and install the power hooks. Later calls
    /// only reapply the trace level.
    pub fn connect(&mut self, accelerator: &mut dyn AcceleratorPort) {
        log::set_max_level(self.config.level_filter());
        if self.power_hooks {
            info!("DCE: {} already connected", self.config.server_name);
            return;
        }
        info!(
            "DCE: {} connect chipset={:#x} debug={}",
            self.config.server_name, self.config.chipset_id, self.config.debug_level
        );
        accelerator.init(self.config.chipset_id);
        self.power_hooks = true;
        info!("DCE: suspend/resume hooks installed");
    }

    pub fn is_connected(&self) -> bool {
        self.power_hooks
    }

    pub fn on_power_event(&mut self, event: PowerEvent, accelerator: &mut dyn AcceleratorPort) {
        if !self.power_hooks {
            warn!("DCE: {:?} before connect, ignored", event);
            return;
        }
        match event {
            PowerEvent::Suspend => {
                accelerator.suspend();
                self.suspended = true;
            }
            PowerEvent::Resume => {
                accelerator.resume();
                self.suspended = false;
            }
        }
        info!("DCE: {:?}", event);
    }

    /// Decode one request payload, run it, and encode the response payload.
    /// A request whose parameters do not decode is answered with a `Wire`
    /// error; only a payload without a readable operation code gets none.
    pub fn dispatch_frame(
        &mut self,
        connection: ConnectionId,
        frame: &[u8],
        ports: &mut Ports<'_>,
    ) -> core::result::Result<Vec<u8>, WireError> {
        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!("DCE[{}]: undecodable request ({} bytes)", connection, frame.len());
                let op = Request::peek_op(frame).ok_or(e)?;
                return Response::failure(op, e.into()).encode();
            }
        };
        let op = request.op;
        let response = self.handle(connection, request, ports);
        response.encode().or_else(|e| {
            warn!("DCE[{}]: {} response not encodable: {}", connection, op.name(), e);
            Response::failure(op, e.into()).encode()
        })
    }

    pub fn handle(
        &mut self,
        connection: ConnectionId,
        request: Request,
        ports: &mut Ports<'_>,
    ) -> Response {
        let op = request.op;
        if self.suspended {
            warn!("DCE[{}]: {} while suspended", connection, op.name());
            return Response::failure(op, DceError::HardwareOperationFailed(STATUS_FAIL));
        }

        match bind(request).and_then(|call| self.execute(connection, call, ports)) {
            Ok(reply) => reply.into_response(op),
            Err(e) => {
                warn!("DCE[{}]: {} failed: {}", connection, op.name(), e);
                Response::failure(op, e)
            }
        }
    }

    fn execute(
        &mut self,
        connection: ConnectionId,
        call: Call,
        ports: &mut Ports<'_>,
    ) -> Result<Reply> {
        match call {
            Call::OpenEngine { msg } => self.open_engine(connection, msg, ports),
            Call::CloseEngine { engine } => self.close_engine(connection, engine, ports),
            Call::CreateCodec(call) => self.create_codec(connection, call, ports),
            Call::ControlCodec(call) => self.control_codec(connection, call, ports),
            Call::GetCodecVersion(call) => self.get_codec_version(connection, call, ports),
            Call::ProcessCodec(call) => self.process_codec(connection, call, ports),
            Call::DeleteCodec { kind, codec } => self.delete_codec(connection, kind, codec),
        }
    }

    /// Release everything `connection` still holds. Idempotent.
    pub fn on_disconnect(
        &mut self,
        connection: ConnectionId,
        ports: &mut Ports<'_>,
    ) -> Result<SweepReport> {
        sweeper::sweep(
            &mut self.registry,
            &mut self.codecs,
            ports,
            connection,
            self.config.idle_timeout_ms,
        )
    }

    pub(super) fn log_stats(&self, connection: ConnectionId) {
        let s = self.registry.stats();
        info!(
            "DCE[{}]: live clients={} engines={} decoders={} encoders={}",
            connection, s.clients, s.engines, s.decoders, s.encoders
        );
    }
}
