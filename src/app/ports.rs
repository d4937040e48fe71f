//! Port traits: the boundary between the server core and the platform.
//!
//! ```text
//!   Platform adapter ──▶ Port trait ──▶ DceServer (registry + handlers)
//! ```
//!
//! Hardware engines, the accelerator, the data cache and the shared memory
//! carveout are all reached through these traits. The codec algorithms sit
//! behind [`CodecBackend`](crate::codec::CodecBackend) instead, because the
//! capability table owns them for the life of the server.

use crate::coherency::SharedRegion;
use crate::error::MemoryError;
use crate::handle::{ConnectionId, EngineHandle};

// ───────────────────────────────────────────────────────────────
// Cache maintenance (driven adapter: server → data cache)
// ───────────────────────────────────────────────────────────────

/// The two cache primitives the coherency gate is built on.
pub trait CachePort {
    /// Drop any cached lines covering `region` so the next read sees what
    /// the remote core wrote.
    fn invalidate(&mut self, region: SharedRegion);

    /// Flush dirty lines covering `region` to memory and drop them.
    fn writeback_invalidate(&mut self, region: SharedRegion);
}

// ───────────────────────────────────────────────────────────────
// Shared memory (driven adapter: server ↔ carveout)
// ───────────────────────────────────────────────────────────────

/// Byte-level access to memory shared with remote clients.
pub trait SharedMemoryPort {
    /// Copy `region` out of shared memory.
    fn read(&self, region: SharedRegion) -> Result<Vec<u8>, MemoryError>;

    /// Copy `data` into the start of `region`. `data` must fit.
    fn write(&mut self, region: SharedRegion, data: &[u8]) -> Result<(), MemoryError>;
}

// ───────────────────────────────────────────────────────────────
// Engines (driven adapter: server → acceleration framework)
// ───────────────────────────────────────────────────────────────

/// Opens and closes hardware acceleration contexts.
pub trait EnginePort {
    /// Open the engine called `name`. On failure returns the framework's
    /// error code, which is written back to the client verbatim.
    fn open(&mut self, name: &str, attrs: u32) -> Result<EngineHandle, i32>;

    fn close(&mut self, engine: EngineHandle);
}

// ───────────────────────────────────────────────────────────────
// Accelerator (driven adapter: server → IVA power and arbitration)
// ───────────────────────────────────────────────────────────────

/// The accelerator did not drain in-flight work before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeout;

pub trait AcceleratorPort {
    /// Bring the accelerator up for the given chipset.
    fn init(&mut self, chipset_id: u32);

    /// Claim the accelerator around a codec call.
    fn acquire(&mut self);

    fn release(&mut self);

    /// Block until no work issued on behalf of `connection` is in flight.
    fn wait_idle(&mut self, connection: ConnectionId, timeout_ms: u32) -> Result<(), IdleTimeout>;

    fn suspend(&mut self);

    fn resume(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// Everything a request handler or a sweep needs from the platform,
/// borrowed for one call.
pub struct Ports<'a> {
    pub engines: &'a mut dyn EnginePort,
    pub accelerator: &'a mut dyn AcceleratorPort,
    pub cache: &'a mut dyn CachePort,
    pub memory: &'a mut dyn SharedMemoryPort,
}

/// Holds the accelerator for the lifetime of the lease.
pub struct AcceleratorLease<'a> {
    accelerator: &'a mut dyn AcceleratorPort,
}

impl<'a> AcceleratorLease<'a> {
    pub fn acquire(accelerator: &'a mut dyn AcceleratorPort) -> Self {
        accelerator.acquire();
        Self { accelerator }
    }
}

impl Drop for AcceleratorLease<'_> {
    fn drop(&mut self) {
        self.accelerator.release();
    }
}
