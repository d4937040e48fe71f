//! The seven operation handlers.
//!
//! Each handler receives an already-bound call and runs the same shape:
//!
//! ```text
//!   admit pointer args ──▶ read ──▶ backend / registry ──▶ write back
//!          │                              │ failure
//!          │                              ▼
//!          │                       undo partial effects
//!          ▼
//!   gate dropped: every admitted region flushed, success or not
//! ```

use log::{debug, info, warn};

use crate::app::ports::{AcceleratorLease, AcceleratorPort, Ports};
use crate::codec::layout::{
    BufDescList, EngineOpenMsg, StaticParams, StatusHeader, extended_error, parse_name,
    sized_block,
};
use crate::codec::{CodecKind, STATUS_FAIL, STATUS_OK, cmd};
use crate::coherency::{CoherencyGate, SharedRegion};
use crate::error::{DceError, Result};
use crate::handle::{CodecHandle, ConnectionId, EngineHandle};

use super::message::InlineReturn;
use super::server::{DceServer, Reply};
use super::signature::{ControlCall, CreateCall, ProcessCall, VersionCall};

/// Dyn params handed to the version query issued after create.
const VERSION_DYN_PARAMS_LEN: usize = 8;

impl DceServer {
    // ── Engines ───────────────────────────────────────────────

    pub(super) fn open_engine(
        &mut self,
        connection: ConnectionId,
        msg: SharedRegion,
        ports: &mut Ports<'_>,
    ) -> Result<Reply> {
        let mut gate = CoherencyGate::new(&mut *ports.cache);
        gate.admit(msg)?;

        let mut bytes = ports.memory.read(msg)?;
        let open = EngineOpenMsg::parse(&bytes)?;

        let outcome = match ports.engines.open(&open.name, open.attrs) {
            Err(code) => {
                warn!("DCE[{}]: engine {:?} open failed, code {}", connection, open.name.as_str(), code);
                Err(DceError::HardwareOperationFailed(code))
            }
            Ok(engine) => match self.registry.register_engine(connection, engine) {
                Ok(()) => Ok(engine),
                Err(e) => {
                    ports.engines.close(engine);
                    Err(DceError::from(e))
                }
            },
        };

        let code = match outcome {
            Ok(_) => STATUS_OK,
            Err(DceError::HardwareOperationFailed(code)) => code,
            Err(_) => STATUS_FAIL,
        };
        EngineOpenMsg::store_error(&mut bytes, code)?;
        ports.memory.write(msg, &bytes)?;

        let engine = outcome?;
        info!("DCE[{}]: opened {:?} as {}", connection, open.name.as_str(), engine);
        Ok(Reply::value(engine.raw() as i32))
    }

    pub(super) fn close_engine(
        &mut self,
        connection: ConnectionId,
        engine: EngineHandle,
        ports: &mut Ports<'_>,
    ) -> Result<Reply> {
        match self.registry.engine_owner(engine) {
            Some(owner) if owner != connection => {
                warn!("DCE[{}]: refusing to close engine {} of {}", connection, engine, owner);
                return Err(DceError::UnknownHandle);
            }
            Some(_) => {
                let last = self
                    .registry
                    .find_client(connection)
                    .is_some_and(|c| c.engine_refs() == 1);
                if last {
                    self.delete_remaining_codecs(connection);
                }
                let _ = self.registry.unregister_engine(connection, engine);
            }
            None => warn!("DCE[{}]: closing untracked engine {}", connection, engine),
        }

        ports.engines.close(engine);
        info!("DCE[{}]: closed engine {}", connection, engine);
        Ok(Reply::value(STATUS_OK))
    }

    // ── Codec lifecycle ───────────────────────────────────────

    pub(super) fn create_codec(
        &mut self,
        connection: ConnectionId,
        call: CreateCall,
        ports: &mut Ports<'_>,
    ) -> Result<Reply> {
        let CreateCall {
            kind,
            engine,
            name,
            params,
        } = call;

        let mut gate = CoherencyGate::new(&mut *ports.cache);
        gate.admit(name)?;
        gate.admit(params)?;

        if self.registry.engine_owner(engine) != Some(connection) {
            warn!("DCE[{}]: {} create on foreign engine {}", connection, kind, engine);
            return Err(DceError::UnknownHandle);
        }

        let codec_name = parse_name(&ports.memory.read(name)?)?;
        let static_params = ports.memory.read(params)?;
        let header = StaticParams::parse(kind, &static_params)?;
        debug!(
            "DCE[{}]: create {} {:?} {}x{}",
            connection,
            kind,
            codec_name.as_str(),
            header.max_width,
            header.max_height
        );

        let created = {
            let _lease = AcceleratorLease::acquire(&mut *ports.accelerator);
            self.codecs.create(
                kind,
                engine,
                &codec_name,
                &static_params[..header.size as usize],
            )
        };
        let Some(codec) = created else {
            warn!("DCE[{}]: {} {:?} create failed", connection, kind, codec_name.as_str());
            return Err(DceError::HardwareOperationFailed(STATUS_FAIL));
        };

        if let Err(e) = self.registry.register_codec(kind, connection, codec) {
            warn!("DCE[{}]: untracked {} {} deleted: {}", connection, kind, codec, e);
            self.codecs.delete(kind, codec);
            return Err(e.into());
        }
        drop(gate);

        info!("DCE[{}]: created {} {:?} as {}", connection, kind, codec_name.as_str(), codec);
        self.log_version(connection, kind, codec, &mut *ports.accelerator);
        self.log_stats(connection);
        Ok(Reply::value(codec.raw() as i32))
    }

    pub(super) fn delete_codec(
        &mut self,
        connection: ConnectionId,
        kind: CodecKind,
        codec: CodecHandle,
    ) -> Result<Reply> {
        match self.registry.codec_owner(kind, codec) {
            Some(owner) if owner != connection => {
                warn!("DCE[{}]: refusing to delete {} {} of {}", connection, kind, codec, owner);
                return Err(DceError::UnknownHandle);
            }
            Some(_) => {
                self.codecs.delete(kind, codec);
                let _ = self.registry.unregister_codec(kind, connection, codec);
            }
            None => {
                warn!("DCE[{}]: deleting untracked {} {}", connection, kind, codec);
                self.codecs.delete(kind, codec);
            }
        }

        info!("DCE[{}]: deleted {} {}", connection, kind, codec);
        self.log_stats(connection);
        Ok(Reply::value(STATUS_OK))
    }

    // ── Codec control ─────────────────────────────────────────

    pub(super) fn control_codec(
        &mut self,
        connection: ConnectionId,
        call: ControlCall,
        ports: &mut Ports<'_>,
    ) -> Result<Reply> {
        let ControlCall {
            kind,
            codec,
            cmd,
            dyn_params,
            status,
        } = call;

        let mut gate = CoherencyGate::new(&mut *ports.cache);
        gate.admit(dyn_params)?;
        gate.admit(status)?;
        self.require_codec(connection, kind, codec)?;

        let mut dyn_bytes = ports.memory.read(dyn_params)?;
        let mut status_bytes = ports.memory.read(status)?;

        let rc = {
            let _lease = AcceleratorLease::acquire(&mut *ports.accelerator);
            self.codecs
                .control(kind, codec, cmd, &mut dyn_bytes, &mut status_bytes, None)
        };
        ports.memory.write(status, &status_bytes)?;

        if rc != STATUS_OK {
            warn!(
                "DCE[{}]: {} {} control {} returned {} (extended {:#x})",
                connection,
                kind,
                codec,
                cmd,
                rc,
                extended_error(&status_bytes).unwrap_or(0)
            );
        }
        Ok(Reply::status(rc))
    }

    pub(super) fn get_codec_version(
        &mut self,
        connection: ConnectionId,
        call: VersionCall,
        ports: &mut Ports<'_>,
    ) -> Result<Reply> {
        let VersionCall {
            kind,
            codec,
            dyn_params,
            status,
        } = call;

        let mut gate = CoherencyGate::new(&mut *ports.cache);
        gate.admit(dyn_params)?;
        gate.admit(status)?;
        self.require_codec(connection, kind, codec)?;

        let mut dyn_bytes = ports.memory.read(dyn_params)?;
        let mut status_bytes = ports.memory.read(status)?;
        let header = StatusHeader::parse(&status_bytes)?;

        gate.admit(header.data)?;
        let mut version = if header.data.is_null() {
            None
        } else {
            Some(ports.memory.read(header.data)?)
        };

        let rc = {
            let _lease = AcceleratorLease::acquire(&mut *ports.accelerator);
            self.codecs.control(
                kind,
                codec,
                cmd::GET_VERSION,
                &mut dyn_bytes,
                &mut status_bytes,
                version.as_deref_mut(),
            )
        };

        ports.memory.write(status, &status_bytes)?;
        if let Some(version) = &version {
            ports.memory.write(header.data, version)?;
        }
        Ok(Reply::status(rc))
    }

    // ── Process ───────────────────────────────────────────────

    pub(super) fn process_codec(
        &mut self,
        connection: ConnectionId,
        call: ProcessCall,
        ports: &mut Ports<'_>,
    ) -> Result<Reply> {
        let ProcessCall {
            kind,
            codec,
            in_bufs,
            out_bufs,
            mut in_args,
            out_args,
        } = call;

        let mut gate = CoherencyGate::new(&mut *ports.cache);
        gate.admit(out_args)?;
        self.require_codec(connection, kind, codec)?;

        let mut in_list = BufDescList::decode(&in_bufs)?;
        let mut out_list = BufDescList::decode(&out_bufs)?;
        let mut out_bytes = ports.memory.read(out_args)?;

        for list in [&in_list, &out_list] {
            if list.reloc.is_empty() {
                continue;
            }
            let rc = self.codecs.reloc(kind, codec, &list.reloc);
            if rc != STATUS_OK {
                warn!(
                    "DCE[{}]: {} {} relocation of {} entries refused ({})",
                    connection,
                    kind,
                    codec,
                    list.reloc.len(),
                    rc
                );
                return Err(DceError::RelocationUnsupported);
            }
        }

        let rc = {
            let _lease = AcceleratorLease::acquire(&mut *ports.accelerator);
            self.codecs.process(
                kind,
                codec,
                &mut in_list,
                &mut out_list,
                &mut in_args,
                &mut out_bytes,
            )
        };
        ports.memory.write(out_args, &out_bytes)?;

        if rc == STATUS_OK {
            debug!(
                "DCE[{}]: {} {} processed {} in / {} out",
                connection,
                kind,
                codec,
                in_list.buffers.len(),
                out_list.buffers.len()
            );
        } else {
            warn!(
                "DCE[{}]: {} {} process returned {} (extended {:#x})",
                connection,
                kind,
                codec,
                rc,
                extended_error(&out_bytes).unwrap_or(0)
            );
        }

        let mut reply = Reply::status(rc);
        reply.inline = vec![
            InlineReturn {
                index: ProcessCall::IN_BUFS_INDEX,
                data: in_list.encode()?,
            },
            InlineReturn {
                index: ProcessCall::OUT_BUFS_INDEX,
                data: out_list.encode()?,
            },
            InlineReturn {
                index: ProcessCall::IN_ARGS_INDEX,
                data: in_args,
            },
        ];
        Ok(reply)
    }

    // ── Helpers ───────────────────────────────────────────────

    /// Delete every codec `connection` still tracks, decoders first. Runs
    /// before the client's last engine closes so no codec outlives its row.
    fn delete_remaining_codecs(&mut self, connection: ConnectionId) {
        for kind in [CodecKind::Decode, CodecKind::Encode] {
            let Some(client) = self.registry.find_client(connection) else {
                return;
            };
            for codec in client.codecs(kind).snapshot() {
                warn!("DCE[{}]: last engine closing, deleting {} {}", connection, kind, codec);
                self.codecs.delete(kind, codec);
                let _ = self.registry.unregister_codec(kind, connection, codec);
            }
        }
        self.log_stats(connection);
    }

    fn require_codec(&self, connection: ConnectionId, kind: CodecKind, codec: CodecHandle) -> Result<()> {
        if self.registry.codec_owner(kind, codec) == Some(connection) {
            Ok(())
        } else {
            warn!("DCE[{}]: {} {} not held by caller", connection, kind, codec);
            Err(DceError::UnknownHandle)
        }
    }

    /// Ask a fresh codec for its version string and log it. Failure here
    /// never fails the create.
    fn log_version(
        &mut self,
        connection: ConnectionId,
        kind: CodecKind,
        codec: CodecHandle,
        accelerator: &mut dyn AcceleratorPort,
    ) {
        let mut version = vec![0u8; self.config.version_buffer_size];
        let mut dyn_params = sized_block(VERSION_DYN_PARAMS_LEN);
        let mut status = StatusHeader::encode(SharedRegion::NULL, StatusHeader::LEN);

        let rc = {
            let _lease = AcceleratorLease::acquire(accelerator);
            self.codecs.control(
                kind,
                codec,
                cmd::GET_VERSION,
                &mut dyn_params,
                &mut status,
                Some(&mut version),
            )
        };
        if rc != STATUS_OK {
            warn!("DCE[{}]: {} {} version query returned {}", connection, kind, codec, rc);
            return;
        }

        let end = version.iter().position(|&b| b == 0).unwrap_or(version.len());
        match core::str::from_utf8(&version[..end]) {
            Ok(text) => info!("DCE[{}]: {} {} version {:?}", connection, kind, codec, text),
            Err(_) => warn!("DCE[{}]: {} {} version is not UTF-8", connection, kind, codec),
        }
    }
}
