//! Operation table: names, argument signatures and request binding.
//!
//! The transport learns the exposed operations from [`SIGNATURES`]. The
//! server uses the same table to turn a raw [`Request`] into a typed
//! [`Call`], rejecting anything whose shape does not match before a single
//! side effect happens.

use serde::{Deserialize, Serialize};

use crate::codec::CodecKind;
use crate::coherency::SharedRegion;
use crate::error::{DceError, Result};
use crate::handle::{CodecHandle, EngineHandle};

use super::message::{Param, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    OpenEngine = 0,
    CloseEngine = 1,
    CreateCodec = 2,
    ControlCodec = 3,
    GetCodecVersion = 4,
    ProcessCodec = 5,
    DeleteCodec = 6,
}

impl OpCode {
    pub const ALL: [Self; 7] = [
        Self::OpenEngine,
        Self::CloseEngine,
        Self::CreateCodec,
        Self::ControlCodec,
        Self::GetCodecVersion,
        Self::ProcessCodec,
        Self::DeleteCodec,
    ];

    pub fn signature(self) -> &'static OpSignature {
        &SIGNATURES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.signature().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    Pointer,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub dir: Direction,
    pub kind: ParamKind,
}

impl ParamSpec {
    const fn new(dir: Direction, kind: ParamKind) -> Self {
        Self { dir, kind }
    }

    /// The server writes this argument back to the client.
    pub const fn is_outbound(self) -> bool {
        matches!(self.dir, Direction::Out | Direction::Bidirectional)
    }
}

#[derive(Debug)]
pub struct OpSignature {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
}

impl OpSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

const SCALAR_IN: ParamSpec = ParamSpec::new(Direction::In, ParamKind::Scalar);
const PTR_IN: ParamSpec = ParamSpec::new(Direction::In, ParamKind::Pointer);
const PTR_BI: ParamSpec = ParamSpec::new(Direction::Bidirectional, ParamKind::Pointer);
const INLINE_BI: ParamSpec = ParamSpec::new(Direction::Bidirectional, ParamKind::Inline);

/// Indexed by `OpCode as usize`.
pub static SIGNATURES: [OpSignature; 7] = [
    OpSignature {
        name: "engine_open",
        params: &[PTR_BI],
    },
    OpSignature {
        name: "engine_close",
        params: &[SCALAR_IN],
    },
    OpSignature {
        name: "codec_create",
        params: &[SCALAR_IN, SCALAR_IN, PTR_IN, PTR_IN],
    },
    OpSignature {
        name: "codec_control",
        params: &[SCALAR_IN, SCALAR_IN, SCALAR_IN, PTR_IN, PTR_BI],
    },
    OpSignature {
        name: "get_version",
        params: &[SCALAR_IN, SCALAR_IN, PTR_IN, PTR_BI],
    },
    OpSignature {
        name: "codec_process",
        params: &[SCALAR_IN, SCALAR_IN, INLINE_BI, INLINE_BI, INLINE_BI, PTR_BI],
    },
    OpSignature {
        name: "codec_delete",
        params: &[SCALAR_IN, SCALAR_IN],
    },
];

// ── Typed calls ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateCall {
    pub kind: CodecKind,
    pub engine: EngineHandle,
    pub name: SharedRegion,
    pub params: SharedRegion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCall {
    pub kind: CodecKind,
    pub codec: CodecHandle,
    pub cmd: u32,
    pub dyn_params: SharedRegion,
    pub status: SharedRegion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCall {
    pub kind: CodecKind,
    pub codec: CodecHandle,
    pub dyn_params: SharedRegion,
    pub status: SharedRegion,
}

/// Arguments of a `process` request. The three inline blobs sit at request
/// positions 2, 3 and 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCall {
    pub kind: CodecKind,
    pub codec: CodecHandle,
    pub in_bufs: Vec<u8>,
    pub out_bufs: Vec<u8>,
    pub in_args: Vec<u8>,
    pub out_args: SharedRegion,
}

impl ProcessCall {
    pub const IN_BUFS_INDEX: u8 = 2;
    pub const OUT_BUFS_INDEX: u8 = 3;
    pub const IN_ARGS_INDEX: u8 = 4;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenEngine { msg: SharedRegion },
    CloseEngine { engine: EngineHandle },
    CreateCodec(CreateCall),
    ControlCodec(ControlCall),
    GetCodecVersion(VersionCall),
    ProcessCodec(ProcessCall),
    DeleteCodec { kind: CodecKind, codec: CodecHandle },
}

/// Check `request` against its signature and convert it into a [`Call`].
pub fn bind(request: Request) -> Result<Call> {
    let sig = request.op.signature();
    if request.params.len() != sig.arity() {
        return Err(DceError::InvalidArgumentCount {
            expected: sig.arity() as u8,
            got: request.params.len().min(u8::MAX as usize) as u8,
        });
    }
    if request
        .params
        .iter()
        .zip(sig.params)
        .any(|(param, spec)| param.kind() != spec.kind)
    {
        return Err(DceError::InvalidArgument("parameter kind mismatch"));
    }

    let mut args = Args(request.params.into_iter());
    let call = match request.op {
        OpCode::OpenEngine => Call::OpenEngine {
            msg: args.pointer()?,
        },
        OpCode::CloseEngine => Call::CloseEngine {
            engine: args.engine()?,
        },
        OpCode::CreateCodec => Call::CreateCodec(CreateCall {
            kind: args.kind()?,
            engine: args.engine()?,
            name: args.pointer()?,
            params: args.pointer()?,
        }),
        OpCode::ControlCodec => Call::ControlCodec(ControlCall {
            kind: args.kind()?,
            codec: args.codec()?,
            cmd: args.scalar()?,
            dyn_params: args.pointer()?,
            status: args.pointer()?,
        }),
        OpCode::GetCodecVersion => Call::GetCodecVersion(VersionCall {
            kind: args.kind()?,
            codec: args.codec()?,
            dyn_params: args.pointer()?,
            status: args.pointer()?,
        }),
        OpCode::ProcessCodec => Call::ProcessCodec(ProcessCall {
            kind: args.kind()?,
            codec: args.codec()?,
            in_bufs: args.inline()?,
            out_bufs: args.inline()?,
            in_args: args.inline()?,
            out_args: args.pointer()?,
        }),
        OpCode::DeleteCodec => Call::DeleteCodec {
            kind: args.kind()?,
            codec: args.codec()?,
        },
    };
    Ok(call)
}

/// Positional reader over already shape-checked parameters.
struct Args(std::vec::IntoIter<Param>);

impl Args {
    fn next(&mut self) -> Result<Param> {
        self.0
            .next()
            .ok_or(DceError::InvalidArgument("missing parameter"))
    }

    fn scalar(&mut self) -> Result<u32> {
        match self.next()? {
            Param::Scalar(v) => Ok(v),
            _ => Err(DceError::InvalidArgument("expected scalar")),
        }
    }

    fn pointer(&mut self) -> Result<SharedRegion> {
        match self.next()? {
            Param::Pointer(r) if r.is_null() => {
                Err(DceError::InvalidArgument("null pointer argument"))
            }
            Param::Pointer(r) => Ok(r),
            _ => Err(DceError::InvalidArgument("expected pointer")),
        }
    }

    fn inline(&mut self) -> Result<Vec<u8>> {
        match self.next()? {
            Param::Inline(bytes) => Ok(bytes),
            _ => Err(DceError::InvalidArgument("expected inline blob")),
        }
    }

    fn kind(&mut self) -> Result<CodecKind> {
        CodecKind::from_tag(self.scalar()?).ok_or(DceError::InvalidArgument("unknown codec kind"))
    }

    fn engine(&mut self) -> Result<EngineHandle> {
        EngineHandle::from_raw(self.scalar()?)
            .ok_or(DceError::InvalidArgument("null engine handle"))
    }

    fn codec(&mut self) -> Result<CodecHandle> {
        CodecHandle::from_raw(self.scalar()?)
            .ok_or(DceError::InvalidArgument("null codec handle"))
    }
}
