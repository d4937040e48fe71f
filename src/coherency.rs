//! Buffer coherency gate.
//!
//! Memory shared with the remote core is cached on this side, so every
//! region a request points at must be invalidated before the server reads
//! it and written back before the response leaves:
//!
//! ```text
//!   request ──▶ admit(region) ── invalidate ──▶ handler reads/writes
//!                                                     │
//!   response ◀── gate dropped ── writeback_invalidate ◀┘
//! ```
//!
//! The writeback happens in `Drop`, so an early `?` return out of a handler
//! still flushes every region it admitted.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::app::ports::CachePort;
use crate::error::{DceError, Result};

/// Most regions a single request can touch (status + nested data buffer
/// + dyn params, with headroom).
pub const MAX_GATED_REGIONS: usize = 8;

/// Explicit (address, length) view of a buffer in shared memory.
///
/// Address zero is the null region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharedRegion {
    pub addr: u32,
    pub len: u32,
}

impl SharedRegion {
    pub const NULL: Self = Self { addr: 0, len: 0 };

    pub const fn new(addr: u32, len: u32) -> Self {
        Self { addr, len }
    }

    pub const fn is_null(self) -> bool {
        self.addr == 0
    }

    /// One past the last byte, or `None` if the region wraps the address space.
    pub const fn end(self) -> Option<u32> {
        self.addr.checked_add(self.len)
    }
}

/// Scoped invalidate/writeback discipline over a [`CachePort`].
pub struct CoherencyGate<'c> {
    cache: &'c mut dyn CachePort,
    admitted: heapless::Vec<SharedRegion, MAX_GATED_REGIONS>,
}

impl<'c> CoherencyGate<'c> {
    pub fn new(cache: &'c mut dyn CachePort) -> Self {
        Self {
            cache,
            admitted: heapless::Vec::new(),
        }
    }

    /// Invalidate `region` now and schedule its writeback for when the gate
    /// closes. Null regions are ignored.
    pub fn admit(&mut self, region: SharedRegion) -> Result<()> {
        if region.is_null() {
            return Ok(());
        }
        self.admitted
            .push(region)
            .map_err(|_| DceError::InvalidArgument("too many shared regions"))?;
        debug!("GATE: invalidate {:#010x}+{}", region.addr, region.len);
        self.cache.invalidate(region);
        Ok(())
    }

    /// Regions that will be written back, in admission order.
    pub fn admitted(&self) -> &[SharedRegion] {
        &self.admitted
    }
}

impl Drop for CoherencyGate<'_> {
    fn drop(&mut self) {
        for region in &self.admitted {
            debug!("GATE: writeback {:#010x}+{}", region.addr, region.len);
            self.cache.writeback_invalidate(*region);
        }
    }
}
