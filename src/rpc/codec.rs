//! Length-prefix frame codec.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │ Length (4B)│ postcard payload (N B)       │
//! │ LE u32     │ Request or Response          │
//! └────────────┴──────────────────────────────┘
//! ```
//!
//! The decoder accepts arbitrary chunking: a single transport read may hold
//! part of a header, several whole frames, or anything in between. Frames
//! announcing a zero or oversize length are dropped and counted.

use heapless::Vec;
use log::warn;

use crate::error::WireError;

/// Maximum frame payload size.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Frame header size (4-byte little-endian length).
pub const HEADER_SIZE: usize = 4;

/// Largest encoded frame, header included.
pub const MAX_WIRE_SIZE: usize = HEADER_SIZE + MAX_FRAME_SIZE;

/// Streaming frame decoder for one connection.
pub struct FrameDecoder {
    header: [u8; HEADER_SIZE],
    header_len: usize,
    expected: Option<usize>,
    payload: Vec<u8, MAX_FRAME_SIZE>,
    rejected: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            header: [0; HEADER_SIZE],
            header_len: 0,
            expected: None,
            payload: Vec::new(),
            rejected: 0,
        }
    }

    /// Feed transport bytes and call `on_frame` for every payload they
    /// complete. Returns how many frames were emitted.
    pub fn push(&mut self, mut data: &[u8], mut on_frame: impl FnMut(&[u8])) -> usize {
        let mut frames = 0;

        while !data.is_empty() {
            match self.expected {
                None => {
                    let take = (HEADER_SIZE - self.header_len).min(data.len());
                    self.header[self.header_len..self.header_len + take]
                        .copy_from_slice(&data[..take]);
                    self.header_len += take;
                    data = &data[take..];

                    if self.header_len == HEADER_SIZE {
                        self.header_len = 0;
                        let len = u32::from_le_bytes(self.header) as usize;
                        if len == 0 || len > MAX_FRAME_SIZE {
                            self.rejected += 1;
                            warn!("FRAME: dropping header announcing {} bytes", len);
                            continue;
                        }
                        self.payload.clear();
                        self.expected = Some(len);
                    }
                }

                Some(len) => {
                    let take = (len - self.payload.len()).min(data.len());
                    if self.payload.extend_from_slice(&data[..take]).is_err() {
                        self.reset();
                        continue;
                    }
                    data = &data[take..];

                    if self.payload.len() == len {
                        self.expected = None;
                        on_frame(&self.payload);
                        frames += 1;
                    }
                }
            }
        }

        frames
    }

    /// Headers dropped for announcing an invalid length.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Forget any partial frame (e.g. after the connection is re-established).
    pub fn reset(&mut self) {
        self.header_len = 0;
        self.expected = None;
        self.payload.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix `payload` with its length.
pub fn encode_frame<const N: usize>(payload: &[u8]) -> Result<Vec<u8, N>, WireError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(WireError::Oversize);
    }
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes())
        .map_err(|()| WireError::Oversize)?;
    out.extend_from_slice(payload)
        .map_err(|()| WireError::Oversize)?;
    Ok(out)
}
