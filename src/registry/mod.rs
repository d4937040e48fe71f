//! Client resource registry.
//!
//! Tracks, per remote connection, which engines and codecs it holds so the
//! server can release them when the connection goes away. The registry
//! never allocates or frees hardware resources. It only records the opaque
//! handles the engine port and codec backends hand out.
//!
//! ```text
//!  Registry (C rows)
//!  ┌──────┬──────┬──────────────┬──────────────┬──────────────┐
//!  │ conn │ refs │ engines[E]   │ decoders[D]  │ encoders[N]  │
//!  ├──────┼──────┼──────────────┼──────────────┼──────────────┤
//!  │ 0x2a │  2   │ e1 e2 -- --  │ k1 -- --     │ -- -- --     │
//!  │ free │  0   │ -- -- -- --  │ -- -- --     │ -- -- --     │
//!  └──────┴──────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! Invariants:
//! - A connection id appears in at most one row.
//! - A handle appears in at most one slot of one row.
//! - `refs` equals the number of live engines; a row whose count reaches
//!   zero is released immediately.

mod client;
mod slots;

pub use client::ClientSlot;
pub use slots::{MAX_INSTANCES, SlotKind, SlotSet};

use log::{debug, error, info, warn};

use crate::codec::CodecKind;
use crate::config::ServerConfig;
use crate::error::RegistryError;
use crate::handle::{CodecHandle, ConnectionId, EngineHandle};

/// Compile-time storage bound for the client table.
pub const MAX_CLIENTS: usize = 32;

/// Live resource counts across every client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub clients: usize,
    pub engines: usize,
    pub decoders: usize,
    pub encoders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    clients: heapless::Vec<ClientSlot, MAX_CLIENTS>,
}

impl Registry {
    /// Build an empty table sized from `config`.
    pub fn new(config: &ServerConfig) -> Self {
        let mut clients = heapless::Vec::new();
        for _ in 0..config.max_clients.min(MAX_CLIENTS) {
            let _ = clients.push(ClientSlot::new(
                config.max_engines,
                config.max_decoders,
                config.max_encoders,
            ));
        }
        Self { clients }
    }

    pub fn capacity(&self) -> usize {
        self.clients.len()
    }

    /// First row owned by `connection`.
    pub fn find_client(&self, connection: ConnectionId) -> Option<&ClientSlot> {
        self.position(connection).map(|i| &self.clients[i])
    }

    /// Rows currently owned by some connection.
    pub fn clients(&self) -> impl Iterator<Item = &ClientSlot> + '_ {
        self.clients.iter().filter(|c| !c.is_free())
    }

    pub fn engine_owner(&self, engine: EngineHandle) -> Option<ConnectionId> {
        self.clients()
            .find(|c| c.engines.contains(engine))
            .and_then(ClientSlot::connection)
    }

    pub fn codec_owner(&self, kind: CodecKind, codec: CodecHandle) -> Option<ConnectionId> {
        self.clients()
            .find(|c| c.codecs(kind).contains(codec))
            .and_then(ClientSlot::connection)
    }

    // ── Engines ───────────────────────────────────────────────

    /// Record that `connection` opened `engine`, claiming a client row on
    /// the connection's first engine.
    pub fn register_engine(
        &mut self,
        connection: ConnectionId,
        engine: EngineHandle,
    ) -> Result<(), RegistryError> {
        if let Some(owner) = self.engine_owner(engine) {
            warn!("REG[{}]: engine {} already held by {}", connection, engine, owner);
            return Err(RegistryError::DuplicateHandle);
        }

        if let Some(index) = self.position(connection) {
            let client = &mut self.clients[index];
            let Some(slot) = client.engines.insert(engine) else {
                warn!("REG[{}]: engine set full, refusing {}", connection, engine);
                return Err(RegistryError::SetFull(SlotKind::Engine));
            };
            client.engine_refs += 1;
            debug!(
                "REG[{}]: engine[{}] = {} refs={}",
                connection, slot, engine, client.engine_refs
            );
            return Ok(());
        }

        let Some(index) = self.clients.iter().position(ClientSlot::is_free) else {
            warn!("REG[{}]: client table full, refusing {}", connection, engine);
            return Err(RegistryError::ClientTableFull);
        };

        let client = &mut self.clients[index];
        client.connection = Some(connection);
        client.engine_refs = 1;
        let landed = client.engines.insert(engine);
        if landed != Some(0)
            || client.engines.len() != 1
            || !client.decoders.is_empty()
            || !client.encoders.is_empty()
        {
            // A free row must be empty. Undo the claim so nothing half
            // registered stays visible.
            error!("REG[{}]: free row {} was not empty, rolling back", connection, index);
            if landed.is_some() {
                client.engines.remove(engine);
            }
            client.connection = None;
            client.engine_refs = 0;
            return Err(RegistryError::ClientTableFull);
        }

        info!("REG[{}]: new client in row {} with engine {}", connection, index, engine);
        Ok(())
    }

    /// Forget `engine` for `connection`; releases the row when its last
    /// engine goes. Unknown handles are reported and leave the table as is.
    /// The last engine cannot go while codecs are still tracked: they would
    /// become unreachable for the disconnect sweep.
    pub fn unregister_engine(
        &mut self,
        connection: ConnectionId,
        engine: EngineHandle,
    ) -> Result<(), RegistryError> {
        let Some(index) = self.position(connection) else {
            warn!("REG[{}]: unregister engine {} for unknown client", connection, engine);
            return Err(RegistryError::UnknownClient);
        };

        let client = &mut self.clients[index];
        if !client.engines.contains(engine) {
            warn!("REG[{}]: unknown engine {}", connection, engine);
            return Err(RegistryError::UnknownHandle);
        }
        let codecs = client.decoders.len() + client.encoders.len();
        if client.engine_refs <= 1 && codecs > 0 {
            warn!(
                "REG[{}]: last engine {} still carries {} codecs, refusing",
                connection, engine, codecs
            );
            return Err(RegistryError::CodecsOutstanding);
        }
        let Some(slot) = client.engines.remove(engine) else {
            return Err(RegistryError::UnknownHandle);
        };

        client.engine_refs = client.engine_refs.saturating_sub(1);
        debug!(
            "REG[{}]: engine[{}] cleared, refs={}",
            connection, slot, client.engine_refs
        );

        if client.engine_refs == 0 {
            client.release();
            info!("REG[{}]: client released", connection);
        }
        Ok(())
    }

    // ── Codecs ────────────────────────────────────────────────

    /// Record a codec created by `connection`. The connection must already
    /// hold an engine. Does not touch the engine refcount.
    pub fn register_codec(
        &mut self,
        kind: CodecKind,
        connection: ConnectionId,
        codec: CodecHandle,
    ) -> Result<(), RegistryError> {
        if let Some(owner) = self.codec_owner(kind, codec) {
            warn!("REG[{}]: {} {} already held by {}", connection, kind, codec, owner);
            return Err(RegistryError::DuplicateHandle);
        }

        let Some(index) = self.position(connection) else {
            warn!("REG[{}]: {} {} for client with no engine", connection, kind, codec);
            return Err(RegistryError::UnknownClient);
        };

        let set = self.clients[index].codecs_mut(kind);
        let Some(slot) = set.insert(codec) else {
            warn!("REG[{}]: {} set full, refusing {}", connection, kind, codec);
            return Err(RegistryError::SetFull(kind.slot_kind()));
        };
        debug!("REG[{}]: {}[{}] = {}", connection, kind, slot, codec);
        Ok(())
    }

    pub fn unregister_codec(
        &mut self,
        kind: CodecKind,
        connection: ConnectionId,
        codec: CodecHandle,
    ) -> Result<(), RegistryError> {
        let Some(index) = self.position(connection) else {
            warn!("REG[{}]: unregister {} {} for unknown client", connection, kind, codec);
            return Err(RegistryError::UnknownClient);
        };

        let Some(slot) = self.clients[index].codecs_mut(kind).remove(codec) else {
            warn!("REG[{}]: unknown {} {}", connection, kind, codec);
            return Err(RegistryError::UnknownHandle);
        };
        debug!("REG[{}]: {}[{}] cleared", connection, kind, slot);
        Ok(())
    }

    // ── Introspection ─────────────────────────────────────────

    pub fn stats(&self) -> RegistryStats {
        self.clients().fold(RegistryStats::default(), |mut acc, c| {
            acc.clients += 1;
            acc.engines += c.engines.len();
            acc.decoders += c.decoders.len();
            acc.encoders += c.encoders.len();
            acc
        })
    }

    fn position(&self, connection: ConnectionId) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.connection == Some(connection))
    }
}
