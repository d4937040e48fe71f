//! Request and response payloads.
//!
//! A request is an operation code plus an ordered list of typed
//! parameters. Buffers that live in shared memory travel as explicit
//! `(addr, len)` regions; structures the server must rewrite in place
//! (the `process` buffer descriptors) travel inline, by value.

use serde::{Deserialize, Serialize};

use crate::coherency::SharedRegion;
use crate::error::{DceError, WireError};

use super::codec::MAX_FRAME_SIZE;
use super::signature::{OpCode, ParamKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Param {
    Scalar(u32),
    Pointer(SharedRegion),
    Inline(Vec<u8>),
}

impl Param {
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Scalar(_) => ParamKind::Scalar,
            Self::Pointer(_) => ParamKind::Pointer,
            Self::Inline(_) => ParamKind::Inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub op: OpCode,
    pub params: Vec<Param>,
}

impl Request {
    pub fn new(op: OpCode, params: Vec<Param>) -> Self {
        Self { op, params }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        postcard::from_bytes(bytes).map_err(|_| WireError::Malformed)
    }

    /// The operation code leading a payload whose parameters may not
    /// decode. Lets a malformed request still be answered.
    pub fn peek_op(bytes: &[u8]) -> Option<OpCode> {
        postcard::take_from_bytes::<OpCode>(bytes).ok().map(|(op, _)| op)
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        encode_payload(self)
    }
}

/// A by-value argument handed back after the server rewrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineReturn {
    /// Position of the argument in the request.
    pub index: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub op: OpCode,
    /// Handle bits, codec status, or -1.
    pub result: i32,
    /// `DceError::code`, zero on success.
    pub error: u8,
    pub inline: Vec<InlineReturn>,
}

impl Response {
    /// Response for a request that failed outright.
    pub fn failure(op: OpCode, error: DceError) -> Self {
        let result = match error {
            DceError::HardwareOperationFailed(status) => status,
            _ => -1,
        };
        Self {
            op,
            result,
            error: error.code(),
            inline: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    /// The handle a successful open or create returned.
    pub fn handle(&self) -> Option<u32> {
        (self.is_ok() && self.result != 0).then_some(self.result as u32)
    }

    pub fn inline_at(&self, index: u8) -> Option<&[u8]> {
        self.inline
            .iter()
            .find(|r| r.index == index)
            .map(|r| r.data.as_slice())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        postcard::from_bytes(bytes).map_err(|_| WireError::Malformed)
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        encode_payload(self)
    }
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let bytes = postcard::to_allocvec(value).map_err(|_| WireError::Encode)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(WireError::Oversize);
    }
    Ok(bytes)
}
