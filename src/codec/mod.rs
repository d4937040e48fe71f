//! Codec capability table.
//!
//! Every request names a codec kind. The table resolves the kind to the
//! backend implementing it, so adding a kind means adding one variant and
//! one backend, with no branching anywhere else:
//!
//! ```text
//!   CodecKind::Decode ──▶ decoder backend ─┐
//!                                          ├─ create · control · process · delete · reloc
//!   CodecKind::Encode ──▶ encoder backend ─┘
//! ```
//!
//! Backends never return Rust errors. A `None` handle or a non-zero status
//! is the failure signal, and the handlers pass it through unchanged.

pub mod layout;

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::{CodecHandle, EngineHandle};
use crate::registry::SlotKind;

use layout::{BufDescList, RelocEntry};

// ── Status and command codes ─────────────────────────────────

pub const STATUS_OK: i32 = 0;
pub const STATUS_FAIL: i32 = -1;
pub const STATUS_UNSUPPORTED: i32 = -3;

/// Control command ids understood by every backend.
pub mod cmd {
    pub const GET_STATUS: u32 = 0;
    pub const SET_PARAMS: u32 = 1;
    pub const RESET: u32 = 2;
    pub const SET_DEFAULT: u32 = 3;
    pub const FLUSH: u32 = 4;
    pub const GET_BUF_INFO: u32 = 5;
    pub const GET_VERSION: u32 = 6;
}

// ── Kinds ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CodecKind {
    Encode = 1,
    Decode = 2,
}

impl CodecKind {
    /// Sweep order: decoders first.
    pub const ALL: [Self; 2] = [Self::Decode, Self::Encode];

    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Encode),
            2 => Some(Self::Decode),
            _ => None,
        }
    }

    pub const fn tag(self) -> u32 {
        self as u32
    }

    pub const fn slot_kind(self) -> SlotKind {
        match self {
            Self::Decode => SlotKind::Decoder,
            Self::Encode => SlotKind::Encoder,
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Decode => "decoder",
            Self::Encode => "encoder",
        })
    }
}

// ── Backend trait ────────────────────────────────────────────

/// One codec family (all decoders, or all encoders).
pub trait CodecBackend {
    fn create(
        &mut self,
        engine: EngineHandle,
        name: &str,
        static_params: &[u8],
    ) -> Option<CodecHandle>;

    /// `data` is the nested buffer a status structure points at, when the
    /// command needs one (e.g. the version string for `GET_VERSION`).
    fn control(
        &mut self,
        codec: CodecHandle,
        cmd: u32,
        dyn_params: &mut [u8],
        status: &mut [u8],
        data: Option<&mut [u8]>,
    ) -> i32;

    fn process(
        &mut self,
        codec: CodecHandle,
        in_bufs: &mut BufDescList,
        out_bufs: &mut BufDescList,
        in_args: &mut [u8],
        out_args: &mut [u8],
    ) -> i32;

    fn delete(&mut self, codec: CodecHandle);

    /// Apply a buffer relocation table. Not supported by default.
    fn reloc(&mut self, codec: CodecHandle, table: &[RelocEntry]) -> i32 {
        let _ = (codec, table);
        STATUS_UNSUPPORTED
    }
}

// ── Table ────────────────────────────────────────────────────

/// Fixed mapping from [`CodecKind`] to its backend, built once at startup.
pub struct CapabilityTable {
    decoder: Box<dyn CodecBackend>,
    encoder: Box<dyn CodecBackend>,
}

impl CapabilityTable {
    pub fn new(decoder: Box<dyn CodecBackend>, encoder: Box<dyn CodecBackend>) -> Self {
        Self { decoder, encoder }
    }

    pub fn backend(&mut self, kind: CodecKind) -> &mut dyn CodecBackend {
        match kind {
            CodecKind::Decode => self.decoder.as_mut(),
            CodecKind::Encode => self.encoder.as_mut(),
        }
    }

    pub fn create(
        &mut self,
        kind: CodecKind,
        engine: EngineHandle,
        name: &str,
        static_params: &[u8],
    ) -> Option<CodecHandle> {
        self.backend(kind).create(engine, name, static_params)
    }

    pub fn control(
        &mut self,
        kind: CodecKind,
        codec: CodecHandle,
        cmd: u32,
        dyn_params: &mut [u8],
        status: &mut [u8],
        data: Option<&mut [u8]>,
    ) -> i32 {
        self.backend(kind).control(codec, cmd, dyn_params, status, data)
    }

    pub fn process(
        &mut self,
        kind: CodecKind,
        codec: CodecHandle,
        in_bufs: &mut BufDescList,
        out_bufs: &mut BufDescList,
        in_args: &mut [u8],
        out_args: &mut [u8],
    ) -> i32 {
        self.backend(kind)
            .process(codec, in_bufs, out_bufs, in_args, out_args)
    }

    pub fn delete(&mut self, kind: CodecKind, codec: CodecHandle) {
        self.backend(kind).delete(codec);
    }

    pub fn reloc(&mut self, kind: CodecKind, codec: CodecHandle, table: &[RelocEntry]) -> i32 {
        self.backend(kind).reloc(codec, table)
    }
}
