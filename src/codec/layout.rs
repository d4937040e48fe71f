//! Layouts of the structures clients place in shared memory.
//!
//! All fields are little-endian. Only the headers the server itself must
//! inspect are decoded here; everything past a header is codec-private
//! and handed to the backend as raw bytes.
//!
//! ```text
//! engine open      name[32] │ attrs u32 │ error_code i32
//! static (dec)     size │ max_height │ max_width │ ...
//! static (enc)     size │ encoding_preset │ rc_preset │ max_height │ max_width │ ...
//! status           size │ extended_error │ data.addr │ data.len │ ...
//! out args         size │ extended_error │ ...
//! ```

use serde::{Deserialize, Serialize};

use crate::coherency::SharedRegion;
use crate::error::{DceError, Result, WireError};

use super::CodecKind;

/// Longest engine or codec name, including the terminator when present.
pub const NAME_LEN: usize = 32;

pub const MAX_BUFFERS: usize = 16;
pub const MAX_RELOC_ENTRIES: usize = 16;

pub const ACCESS_READ: u32 = 1 << 0;
pub const ACCESS_WRITE: u32 = 1 << 1;

pub type Name = heapless::String<NAME_LEN>;

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let field = bytes.get(offset..offset + 4)?;
    field.try_into().ok().map(u32::from_le_bytes)
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) -> Option<()> {
    bytes
        .get_mut(offset..offset + 4)?
        .copy_from_slice(&value.to_le_bytes());
    Some(())
}

/// Decode a NUL-terminated (or exactly full) UTF-8 name.
pub fn parse_name(bytes: &[u8]) -> Result<Name> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if end == 0 {
        return Err(DceError::InvalidArgument("empty name"));
    }
    if end > NAME_LEN {
        return Err(DceError::InvalidArgument("name too long"));
    }
    let text = core::str::from_utf8(&bytes[..end])
        .map_err(|_| DceError::InvalidArgument("name is not UTF-8"))?;
    let mut name = Name::new();
    name.push_str(text)
        .map_err(|()| DceError::InvalidArgument("name too long"))?;
    Ok(name)
}

// ── Engine open ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOpenMsg {
    pub name: Name,
    pub attrs: u32,
    pub error_code: i32,
}

impl EngineOpenMsg {
    pub const LEN: usize = NAME_LEN + 8;
    const ATTRS: usize = NAME_LEN;
    const ERROR_CODE: usize = NAME_LEN + 4;

    pub fn new(name: &str, attrs: u32) -> Result<Self> {
        Ok(Self {
            name: parse_name(name.as_bytes())?,
            attrs,
            error_code: 0,
        })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::LEN {
            return Err(DceError::InvalidArgument("engine open message too short"));
        }
        Ok(Self {
            name: parse_name(&bytes[..NAME_LEN])?,
            attrs: read_u32(bytes, Self::ATTRS).unwrap_or(0),
            error_code: read_u32(bytes, Self::ERROR_CODE).unwrap_or(0) as i32,
        })
    }

    /// Overwrite only the error code field of an encoded message.
    pub fn store_error(bytes: &mut [u8], code: i32) -> Result<()> {
        write_u32(bytes, Self::ERROR_CODE, code as u32)
            .ok_or(DceError::InvalidArgument("engine open message too short"))
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..self.name.len()].copy_from_slice(self.name.as_bytes());
        out[Self::ATTRS..Self::ATTRS + 4].copy_from_slice(&self.attrs.to_le_bytes());
        out[Self::ERROR_CODE..].copy_from_slice(&self.error_code.to_le_bytes());
        out
    }
}

// ── Static params ────────────────────────────────────────────

/// The part of a codec's creation parameters the server validates before
/// the codec ever sees them. Codecs divide by the frame geometry during
/// setup, so zero dimensions are refused here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticParams {
    pub size: u32,
    pub max_height: u32,
    pub max_width: u32,
}

impl StaticParams {
    /// Bytes of header for `kind`.
    pub const fn header_len(kind: CodecKind) -> usize {
        match kind {
            CodecKind::Decode => 12,
            CodecKind::Encode => 20,
        }
    }

    const fn geometry_offset(kind: CodecKind) -> usize {
        match kind {
            CodecKind::Decode => 4,
            CodecKind::Encode => 12,
        }
    }

    pub fn parse(kind: CodecKind, bytes: &[u8]) -> Result<Self> {
        let header = Self::header_len(kind);
        let geometry = Self::geometry_offset(kind);
        let (Some(size), Some(max_height), Some(max_width)) = (
            read_u32(bytes, 0),
            read_u32(bytes, geometry),
            read_u32(bytes, geometry + 4),
        ) else {
            return Err(DceError::InvalidArgument("static params too short"));
        };

        if (size as usize) < header || size as usize > bytes.len() {
            return Err(DceError::InvalidArgument("static params size out of range"));
        }
        if max_height == 0 {
            return Err(DceError::InvalidArgument("static params max height is zero"));
        }
        if max_width == 0 {
            return Err(DceError::InvalidArgument("static params max width is zero"));
        }
        Ok(Self {
            size,
            max_height,
            max_width,
        })
    }

    /// Minimal header-only encoding for `kind`.
    pub fn encode(kind: CodecKind, max_height: u32, max_width: u32) -> Vec<u8> {
        let header = Self::header_len(kind);
        let geometry = Self::geometry_offset(kind);
        let mut out = vec![0u8; header];
        let _ = write_u32(&mut out, 0, header as u32);
        let _ = write_u32(&mut out, geometry, max_height);
        let _ = write_u32(&mut out, geometry + 4, max_width);
        out
    }
}

// ── Status ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHeader {
    pub size: u32,
    pub extended_error: u32,
    /// Nested buffer the codec fills for data-returning commands.
    pub data: SharedRegion,
}

impl StatusHeader {
    pub const LEN: usize = 16;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (Some(size), Some(extended_error), Some(addr), Some(len)) = (
            read_u32(bytes, 0),
            read_u32(bytes, 4),
            read_u32(bytes, 8),
            read_u32(bytes, 12),
        ) else {
            return Err(DceError::InvalidArgument("status too short"));
        };
        Ok(Self {
            size,
            extended_error,
            data: SharedRegion::new(addr, len),
        })
    }

    /// A status block of `total_len` bytes pointing at `data`.
    pub fn encode(data: SharedRegion, total_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; total_len.max(Self::LEN)];
        let len = out.len() as u32;
        let _ = write_u32(&mut out, 0, len);
        let _ = write_u32(&mut out, 8, data.addr);
        let _ = write_u32(&mut out, 12, data.len);
        out
    }
}

/// Extended error word every status and out-args block carries at offset 4.
pub fn extended_error(bytes: &[u8]) -> Option<u32> {
    read_u32(bytes, 4)
}

pub fn set_extended_error(bytes: &mut [u8], value: u32) -> Option<()> {
    write_u32(bytes, 4, value)
}

/// Zeroed block of `total_len` bytes whose leading word holds its size.
/// Dyn params and out args both start this way.
pub fn sized_block(total_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; total_len.max(4)];
    let len = out.len() as u32;
    let _ = write_u32(&mut out, 0, len);
    out
}

/// Header-only out-args block of `total_len` bytes.
pub fn encode_out_args(total_len: usize) -> Vec<u8> {
    sized_block(total_len.max(8))
}

// ── Process buffer descriptors ───────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDescriptor {
    pub region: SharedRegion,
    pub access_mask: u32,
}

/// Pointer fix-up request: patch the word at `offset` to point at `target`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocEntry {
    pub offset: u32,
    pub target: u32,
}

/// Inline buffer descriptor list passed by value in `process` requests.
/// The codec may rewrite descriptors; the rewritten list goes back to the
/// client in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufDescList {
    pub buffers: heapless::Vec<BufferDescriptor, MAX_BUFFERS>,
    pub reloc: heapless::Vec<RelocEntry, MAX_RELOC_ENTRIES>,
}

impl BufDescList {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes)
            .map_err(|_| DceError::InvalidArgument("malformed buffer descriptor list"))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|_| DceError::Wire(WireError::Encode))
    }
}
