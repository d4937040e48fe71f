//! In-memory platform: every port backed by plain host data structures.
//!
//! Used by the host binary and by tests that need real bytes behind a
//! [`SharedRegion`]. Handles are generation-tagged so a handle to a
//! released instance is never accepted again.
//!
//! ```text
//!   SimMemory ─── bump-allocated arena at ARENA_BASE (shared via Rc)
//!   SimCache ──── counts invalidate / writeback calls
//!   SimEngines ── named engines, slot table
//!   SimCodec ──── one per codec kind, slot table of instances
//!   SimAccelerator  records init / lease / power calls
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::app::ports::{
    AcceleratorPort, CachePort, EnginePort, IdleTimeout, Ports, SharedMemoryPort,
};
use crate::codec::layout::{
    ACCESS_READ, ACCESS_WRITE, BufDescList, Name, RelocEntry, set_extended_error,
};
use crate::codec::{
    CapabilityTable, CodecBackend, CodecKind, STATUS_FAIL, STATUS_OK, STATUS_UNSUPPORTED, cmd,
};
use crate::coherency::SharedRegion;
use crate::error::MemoryError;
use crate::handle::{CodecHandle, ConnectionId, EngineHandle};

/// Address the simulated carveout is mapped at.
pub const ARENA_BASE: u32 = 0x9000_0000;

const ARENA_ALIGN: usize = 16;

/// Engine name is not known to the framework.
pub const ENGINE_EEXIST: i32 = 1;
/// No room for another open engine.
pub const ENGINE_ENOMEM: i32 = 2;

/// Extended error: `process` was called without input buffers.
pub const EXT_NO_INPUT: u32 = 0x0000_8000;

// ───────────────────────────────────────────────────────────────
// Slot table shared by engines and codec instances
// ───────────────────────────────────────────────────────────────

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

struct HandleTable<T> {
    slots: Vec<Slot<T>>,
}

impl<T> HandleTable<T> {
    fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity.min(usize::from(u16::MAX)))
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        Self { slots }
    }

    /// Store `value`, returning `(index, generation)`.
    fn insert(&mut self, value: T) -> Option<(u16, u16)> {
        let index = self.slots.iter().position(|s| s.value.is_none())?;
        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = Some(value);
        Some((u16::try_from(index).ok()?, slot.generation))
    }

    fn get_mut(&mut self, index: u16, generation: u16) -> Option<&mut T> {
        let slot = self.slots.get_mut(usize::from(index))?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_mut()
    }

    fn remove(&mut self, index: u16, generation: u16) -> Option<T> {
        let slot = self.slots.get_mut(usize::from(index))?;
        if slot.generation != generation {
            return None;
        }
        slot.value.take()
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }
}

// ───────────────────────────────────────────────────────────────
// Shared memory
// ───────────────────────────────────────────────────────────────

struct Arena {
    bytes: Vec<u8>,
    next: usize,
}

impl Arena {
    fn span(&self, region: SharedRegion) -> Result<core::ops::Range<usize>, MemoryError> {
        if region.is_null() || region.addr < ARENA_BASE {
            return Err(MemoryError::Unmapped);
        }
        let start = (region.addr - ARENA_BASE) as usize;
        if start >= self.bytes.len() {
            return Err(MemoryError::Unmapped);
        }
        let end = start
            .checked_add(region.len as usize)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(MemoryError::OutOfBounds)?;
        Ok(start..end)
    }
}

/// Cloneable handle to one simulated carveout. Clones see the same bytes,
/// so a test can play the client while the server holds the port.
#[derive(Clone)]
pub struct SimMemory(Rc<RefCell<Arena>>);

impl SimMemory {
    pub fn new(size: usize) -> Self {
        Self(Rc::new(RefCell::new(Arena {
            bytes: vec![0; size],
            next: 0,
        })))
    }

    /// Carve out `len` zeroed bytes.
    pub fn alloc(&self, len: usize) -> Result<SharedRegion, MemoryError> {
        let mut arena = self.0.borrow_mut();
        let start = arena.next;
        let end = start.checked_add(len).ok_or(MemoryError::OutOfBounds)?;
        if end > arena.bytes.len() {
            return Err(MemoryError::OutOfBounds);
        }
        arena.next = end.next_multiple_of(ARENA_ALIGN);
        let addr = u32::try_from(start)
            .ok()
            .and_then(|offset| ARENA_BASE.checked_add(offset))
            .ok_or(MemoryError::OutOfBounds)?;
        let len = u32::try_from(len).map_err(|_| MemoryError::OutOfBounds)?;
        Ok(SharedRegion::new(addr, len))
    }

    /// Allocate a region holding a copy of `data`.
    pub fn alloc_with(&self, data: &[u8]) -> Result<SharedRegion, MemoryError> {
        let region = self.alloc(data.len())?;
        self.poke(region, data)?;
        Ok(region)
    }

    /// Client-side write.
    pub fn poke(&self, region: SharedRegion, data: &[u8]) -> Result<(), MemoryError> {
        if data.len() > region.len as usize {
            return Err(MemoryError::TooShort);
        }
        let mut arena = self.0.borrow_mut();
        let span = arena.span(region)?;
        arena.bytes[span.start..span.start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Client-side read.
    pub fn peek(&self, region: SharedRegion) -> Result<Vec<u8>, MemoryError> {
        let arena = self.0.borrow();
        let span = arena.span(region)?;
        Ok(arena.bytes[span].to_vec())
    }
}

impl SharedMemoryPort for SimMemory {
    fn read(&self, region: SharedRegion) -> Result<Vec<u8>, MemoryError> {
        self.peek(region)
    }

    fn write(&mut self, region: SharedRegion, data: &[u8]) -> Result<(), MemoryError> {
        self.poke(region, data)
    }
}

// ───────────────────────────────────────────────────────────────
// Cache
// ───────────────────────────────────────────────────────────────

/// Host memory is coherent; only the maintenance calls are counted.
#[derive(Debug, Default)]
pub struct SimCache {
    pub invalidated: u32,
    pub written_back: u32,
}

impl CachePort for SimCache {
    fn invalidate(&mut self, _region: SharedRegion) {
        self.invalidated += 1;
    }

    fn writeback_invalidate(&mut self, _region: SharedRegion) {
        self.written_back += 1;
    }
}

// ───────────────────────────────────────────────────────────────
// Engines
// ───────────────────────────────────────────────────────────────

pub struct SimEngines {
    known: &'static [&'static str],
    open: HandleTable<Name>,
}

impl SimEngines {
    pub const DEFAULT_NAMES: &'static [&'static str] = &["ivahd_vidsvr", "dsp_vidsvr"];

    pub fn new(known: &'static [&'static str], capacity: usize) -> Self {
        Self {
            known,
            open: HandleTable::with_capacity(capacity),
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.live()
    }
}

impl Default for SimEngines {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAMES, 32)
    }
}

impl EnginePort for SimEngines {
    fn open(&mut self, name: &str, attrs: u32) -> Result<EngineHandle, i32> {
        if !self.known.iter().any(|known| *known == name) {
            return Err(ENGINE_EEXIST);
        }
        let mut stored = Name::new();
        stored.push_str(name).map_err(|()| ENGINE_EEXIST)?;
        let (index, generation) = self.open.insert(stored).ok_or(ENGINE_ENOMEM)?;
        let handle = EngineHandle::tagged(index, generation).ok_or(ENGINE_ENOMEM)?;
        debug!("SIM: engine {} open as {} (attrs {:#x})", name, handle, attrs);
        Ok(handle)
    }

    fn close(&mut self, engine: EngineHandle) {
        if self.open.remove(engine.index(), engine.generation()).is_none() {
            warn!("SIM: close of unknown engine {}", engine);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Codecs
// ───────────────────────────────────────────────────────────────

struct Instance {
    name: Name,
    engine: EngineHandle,
    frames: u32,
}

/// A codec family that accepts a fixed list of algorithm names and counts
/// frames instead of transforming them.
pub struct SimCodec {
    kind: CodecKind,
    algorithms: &'static [&'static str],
    instances: HandleTable<Instance>,
}

impl SimCodec {
    pub const DECODERS: &'static [&'static str] = &["h264dec", "mpeg4dec", "mpeg2dec", "jpegdec"];
    pub const ENCODERS: &'static [&'static str] = &["h264enc", "mpeg4enc", "jpegenc"];

    pub fn new(kind: CodecKind, algorithms: &'static [&'static str], capacity: usize) -> Self {
        Self {
            kind,
            algorithms,
            instances: HandleTable::with_capacity(capacity),
        }
    }

    pub fn decoder() -> Self {
        Self::new(CodecKind::Decode, Self::DECODERS, 64)
    }

    pub fn encoder() -> Self {
        Self::new(CodecKind::Encode, Self::ENCODERS, 64)
    }

    fn instance(&mut self, codec: CodecHandle) -> Option<&mut Instance> {
        self.instances.get_mut(codec.index(), codec.generation())
    }
}

impl CodecBackend for SimCodec {
    fn create(
        &mut self,
        engine: EngineHandle,
        name: &str,
        static_params: &[u8],
    ) -> Option<CodecHandle> {
        if !self.algorithms.iter().any(|algo| *algo == name) {
            warn!("SIM: no {} named {:?}", self.kind, name);
            return None;
        }
        let mut stored = Name::new();
        stored.push_str(name).ok()?;
        let (index, generation) = self.instances.insert(Instance {
            name: stored,
            engine,
            frames: 0,
        })?;
        let handle = CodecHandle::tagged(index, generation)?;
        debug!(
            "SIM: {} {:?} on {} as {} ({} param bytes)",
            self.kind,
            name,
            engine,
            handle,
            static_params.len()
        );
        Some(handle)
    }

    fn control(
        &mut self,
        codec: CodecHandle,
        command: u32,
        _dyn_params: &mut [u8],
        status: &mut [u8],
        data: Option<&mut [u8]>,
    ) -> i32 {
        let kind = self.kind;
        let Some(instance) = self.instance(codec) else {
            return STATUS_FAIL;
        };
        let _ = set_extended_error(status, 0);

        match command {
            cmd::GET_VERSION => {
                let Some(data) = data else {
                    return STATUS_FAIL;
                };
                let version = format!("sim-{} 1.0.0 ({})", instance.name, kind);
                if version.len() >= data.len() {
                    return STATUS_FAIL;
                }
                data[..version.len()].copy_from_slice(version.as_bytes());
                data[version.len()] = 0;
                STATUS_OK
            }
            cmd::RESET | cmd::FLUSH => {
                instance.frames = 0;
                STATUS_OK
            }
            cmd::GET_STATUS | cmd::SET_PARAMS | cmd::SET_DEFAULT | cmd::GET_BUF_INFO => STATUS_OK,
            _ => STATUS_UNSUPPORTED,
        }
    }

    fn process(
        &mut self,
        codec: CodecHandle,
        in_bufs: &mut BufDescList,
        out_bufs: &mut BufDescList,
        _in_args: &mut [u8],
        out_args: &mut [u8],
    ) -> i32 {
        let Some(instance) = self.instance(codec) else {
            return STATUS_FAIL;
        };
        if in_bufs.buffers.is_empty() {
            let _ = set_extended_error(out_args, EXT_NO_INPUT);
            return STATUS_FAIL;
        }

        instance.frames += 1;
        for desc in &mut in_bufs.buffers {
            desc.access_mask |= ACCESS_READ;
        }
        for desc in &mut out_bufs.buffers {
            desc.access_mask |= ACCESS_WRITE;
        }

        let _ = set_extended_error(out_args, 0);
        if let Some(word) = out_args.get_mut(8..12) {
            word.copy_from_slice(&instance.frames.to_le_bytes());
        }
        STATUS_OK
    }

    fn delete(&mut self, codec: CodecHandle) {
        match self.instances.remove(codec.index(), codec.generation()) {
            Some(instance) => debug!(
                "SIM: {} {} ({:?} on {}) deleted after {} frames",
                self.kind, codec, instance.name.as_str(), instance.engine, instance.frames
            ),
            None => warn!("SIM: delete of unknown {} {}", self.kind, codec),
        }
    }

    fn reloc(&mut self, codec: CodecHandle, table: &[RelocEntry]) -> i32 {
        debug!("SIM: {} {} refuses {} relocations", self.kind, codec, table.len());
        STATUS_UNSUPPORTED
    }
}

// ───────────────────────────────────────────────────────────────
// Accelerator
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimAccelerator {
    pub chipset_id: Option<u32>,
    pub inits: u32,
    pub held: u32,
    pub acquisitions: u32,
    pub suspended: bool,
    /// Make `wait_idle` time out.
    pub wedged: bool,
}

impl AcceleratorPort for SimAccelerator {
    fn init(&mut self, chipset_id: u32) {
        self.inits += 1;
        self.chipset_id = Some(chipset_id);
        info!("SIM: accelerator up for chipset {:#x}", chipset_id);
    }

    fn acquire(&mut self) {
        self.held += 1;
        self.acquisitions += 1;
    }

    fn release(&mut self) {
        self.held = self.held.saturating_sub(1);
    }

    fn wait_idle(&mut self, connection: ConnectionId, timeout_ms: u32) -> Result<(), IdleTimeout> {
        debug!("SIM: wait idle for {} ({} ms)", connection, timeout_ms);
        if self.wedged { Err(IdleTimeout) } else { Ok(()) }
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }
}

// ───────────────────────────────────────────────────────────────
// Bundle
// ───────────────────────────────────────────────────────────────

/// Every simulated port in one place.
pub struct SimPlatform {
    pub memory: SimMemory,
    pub cache: SimCache,
    pub engines: SimEngines,
    pub accelerator: SimAccelerator,
}

impl SimPlatform {
    pub fn new(arena_size: usize) -> Self {
        Self {
            memory: SimMemory::new(arena_size),
            cache: SimCache::default(),
            engines: SimEngines::default(),
            accelerator: SimAccelerator::default(),
        }
    }

    /// Decoder and encoder backends for the server.
    pub fn codecs() -> CapabilityTable {
        CapabilityTable::new(Box::new(SimCodec::decoder()), Box::new(SimCodec::encoder()))
    }

    pub fn ports(&mut self) -> Ports<'_> {
        Ports {
            engines: &mut self.engines,
            accelerator: &mut self.accelerator,
            cache: &mut self.cache,
            memory: &mut self.memory,
        }
    }
}
