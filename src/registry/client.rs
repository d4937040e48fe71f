//! One row of the registry: everything a single connection holds.

use crate::codec::CodecKind;
use crate::handle::{CodecHandle, ConnectionId, EngineHandle};

use super::slots::SlotSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSlot {
    pub(super) connection: Option<ConnectionId>,
    pub(super) engine_refs: u32,
    pub(super) engines: SlotSet<EngineHandle>,
    pub(super) decoders: SlotSet<CodecHandle>,
    pub(super) encoders: SlotSet<CodecHandle>,
}

impl ClientSlot {
    pub(super) fn new(engines: usize, decoders: usize, encoders: usize) -> Self {
        Self {
            connection: None,
            engine_refs: 0,
            engines: SlotSet::with_capacity(engines),
            decoders: SlotSet::with_capacity(decoders),
            encoders: SlotSet::with_capacity(encoders),
        }
    }

    pub fn is_free(&self) -> bool {
        self.connection.is_none()
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// Live engines opened by this client.
    pub fn engine_refs(&self) -> u32 {
        self.engine_refs
    }

    pub fn engines(&self) -> &SlotSet<EngineHandle> {
        &self.engines
    }

    pub fn codecs(&self, kind: CodecKind) -> &SlotSet<CodecHandle> {
        match kind {
            CodecKind::Decode => &self.decoders,
            CodecKind::Encode => &self.encoders,
        }
    }

    pub(super) fn codecs_mut(&mut self, kind: CodecKind) -> &mut SlotSet<CodecHandle> {
        match kind {
            CodecKind::Decode => &mut self.decoders,
            CodecKind::Encode => &mut self.encoders,
        }
    }

    /// Return the row to the free pool. Callers make sure no codec is
    /// still tracked.
    pub(super) fn release(&mut self) {
        debug_assert!(self.decoders.is_empty() && self.encoders.is_empty());
        self.connection = None;
        self.engine_refs = 0;
        self.engines.clear();
        self.decoders.clear();
        self.encoders.clear();
    }
}
