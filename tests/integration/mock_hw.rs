//! Mock platform for integration tests.
//!
//! Every port and codec backend appends to one shared journal so tests can
//! assert on the exact order of cache, engine, codec and accelerator calls.
//! Shared memory is the real simulated arena, so handlers read and write
//! actual bytes.

use std::cell::RefCell;
use std::rc::Rc;

use dce_server::adapters::sim::SimMemory;
use dce_server::app::ports::{
    AcceleratorPort, CachePort, EnginePort, IdleTimeout, Ports,
};
use dce_server::codec::layout::{
    ACCESS_WRITE, BufDescList, EngineOpenMsg, StaticParams, StatusHeader, encode_out_args,
    set_extended_error, sized_block,
};
use dce_server::codec::{CapabilityTable, CodecBackend, CodecKind, STATUS_OK, cmd};
use dce_server::coherency::SharedRegion;
use dce_server::config::ServerConfig;
use dce_server::error::Result;
use dce_server::handle::{CodecHandle, ConnectionId, EngineHandle};
use dce_server::rpc::message::{Param, Request, Response};
use dce_server::rpc::signature::OpCode;
use dce_server::rpc::{DceServer, SweepReport};

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwCall {
    Invalidate(SharedRegion),
    Writeback(SharedRegion),
    EngineOpen(String),
    EngineClose(EngineHandle),
    Create(CodecKind, String),
    Control(CodecKind, CodecHandle, u32),
    Process(CodecKind, CodecHandle),
    Delete(CodecKind, CodecHandle),
    Init(u32),
    Acquire,
    Release,
    WaitIdle(ConnectionId),
    Suspend,
    Resume,
}

pub type Journal = Rc<RefCell<Vec<HwCall>>>;

/// Failure injection shared with the mocks after they are boxed.
#[derive(Debug, Default)]
pub struct Faults {
    pub engine_error: Option<i32>,
    pub fail_create: bool,
    /// Status returned by every control and process call.
    pub codec_status: i32,
    pub wedged: bool,
}

pub type SharedFaults = Rc<RefCell<Faults>>;

pub const VERSION: &str = "mock-codec 2.1";

// ── Cache ─────────────────────────────────────────────────────

pub struct MockCache(Journal);

impl CachePort for MockCache {
    fn invalidate(&mut self, region: SharedRegion) {
        self.0.borrow_mut().push(HwCall::Invalidate(region));
    }

    fn writeback_invalidate(&mut self, region: SharedRegion) {
        self.0.borrow_mut().push(HwCall::Writeback(region));
    }
}

// ── Engines ───────────────────────────────────────────────────

pub struct MockEngines {
    journal: Journal,
    faults: SharedFaults,
    next: u16,
}

impl EnginePort for MockEngines {
    fn open(&mut self, name: &str, _attrs: u32) -> core::result::Result<EngineHandle, i32> {
        self.journal.borrow_mut().push(HwCall::EngineOpen(name.to_owned()));
        if let Some(code) = self.faults.borrow().engine_error {
            return Err(code);
        }
        self.next += 1;
        EngineHandle::tagged(self.next, 1).ok_or(-1)
    }

    fn close(&mut self, engine: EngineHandle) {
        self.journal.borrow_mut().push(HwCall::EngineClose(engine));
    }
}

// ── Codecs ────────────────────────────────────────────────────

pub struct MockCodec {
    kind: CodecKind,
    journal: Journal,
    faults: SharedFaults,
    next: u16,
}

impl CodecBackend for MockCodec {
    fn create(&mut self, _engine: EngineHandle, name: &str, _static_params: &[u8]) -> Option<CodecHandle> {
        self.journal
            .borrow_mut()
            .push(HwCall::Create(self.kind, name.to_owned()));
        if self.faults.borrow().fail_create {
            return None;
        }
        self.next += 1;
        CodecHandle::tagged(self.next, self.kind.tag() as u16)
    }

    fn control(
        &mut self,
        codec: CodecHandle,
        command: u32,
        _dyn_params: &mut [u8],
        status: &mut [u8],
        data: Option<&mut [u8]>,
    ) -> i32 {
        self.journal
            .borrow_mut()
            .push(HwCall::Control(self.kind, codec, command));
        let rc = self.faults.borrow().codec_status;
        if rc != STATUS_OK {
            let _ = set_extended_error(status, 0xBAD);
            return rc;
        }
        if let (cmd::GET_VERSION, Some(data)) = (command, data) {
            let n = VERSION.len().min(data.len());
            data[..n].copy_from_slice(&VERSION.as_bytes()[..n]);
        }
        STATUS_OK
    }

    fn process(
        &mut self,
        codec: CodecHandle,
        _in_bufs: &mut BufDescList,
        out_bufs: &mut BufDescList,
        in_args: &mut [u8],
        out_args: &mut [u8],
    ) -> i32 {
        self.journal
            .borrow_mut()
            .push(HwCall::Process(self.kind, codec));
        for desc in &mut out_bufs.buffers {
            desc.access_mask |= ACCESS_WRITE;
        }
        if let Some(first) = in_args.get_mut(4) {
            *first = 0xAA;
        }
        let rc = self.faults.borrow().codec_status;
        let _ = set_extended_error(out_args, if rc == STATUS_OK { 0 } else { 0x42 });
        rc
    }

    fn delete(&mut self, codec: CodecHandle) {
        self.journal.borrow_mut().push(HwCall::Delete(self.kind, codec));
    }
}

// ── Accelerator ───────────────────────────────────────────────

pub struct MockAccelerator {
    journal: Journal,
    faults: SharedFaults,
}

impl AcceleratorPort for MockAccelerator {
    fn init(&mut self, chipset_id: u32) {
        self.journal.borrow_mut().push(HwCall::Init(chipset_id));
    }

    fn acquire(&mut self) {
        self.journal.borrow_mut().push(HwCall::Acquire);
    }

    fn release(&mut self) {
        self.journal.borrow_mut().push(HwCall::Release);
    }

    fn wait_idle(&mut self, connection: ConnectionId, _timeout_ms: u32) -> core::result::Result<(), IdleTimeout> {
        self.journal.borrow_mut().push(HwCall::WaitIdle(connection));
        if self.faults.borrow().wedged { Err(IdleTimeout) } else { Ok(()) }
    }

    fn suspend(&mut self) {
        self.journal.borrow_mut().push(HwCall::Suspend);
    }

    fn resume(&mut self) {
        self.journal.borrow_mut().push(HwCall::Resume);
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// A server wired to the mocks, plus client-side helpers.
pub struct Rig {
    pub server: DceServer,
    pub memory: SimMemory,
    pub journal: Journal,
    pub faults: SharedFaults,
    cache: MockCache,
    engines: MockEngines,
    accelerator: MockAccelerator,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let journal = Journal::default();
        let faults = SharedFaults::default();
        let codec = |kind| {
            Box::new(MockCodec {
                kind,
                journal: journal.clone(),
                faults: faults.clone(),
                next: 0,
            })
        };
        let codecs = CapabilityTable::new(codec(CodecKind::Decode), codec(CodecKind::Encode));
        Self {
            server: DceServer::new(config, codecs).unwrap(),
            memory: SimMemory::new(1 << 20),
            cache: MockCache(journal.clone()),
            engines: MockEngines {
                journal: journal.clone(),
                faults: faults.clone(),
                next: 0,
            },
            accelerator: MockAccelerator {
                journal: journal.clone(),
                faults: faults.clone(),
            },
            journal,
            faults,
        }
    }

    fn split(&mut self) -> (&mut DceServer, Ports<'_>) {
        (
            &mut self.server,
            Ports {
                engines: &mut self.engines,
                accelerator: &mut self.accelerator,
                cache: &mut self.cache,
                memory: &mut self.memory,
            },
        )
    }

    pub fn call(&mut self, conn: ConnectionId, op: OpCode, params: Vec<Param>) -> Response {
        let (server, mut ports) = self.split();
        server.handle(conn, Request::new(op, params), &mut ports)
    }

    pub fn disconnect(&mut self, conn: ConnectionId) -> Result<SweepReport> {
        let (server, mut ports) = self.split();
        server.on_disconnect(conn, &mut ports)
    }

    pub fn connect(&mut self) {
        self.server.connect(&mut self.accelerator);
    }

    pub fn power(&mut self, event: dce_server::rpc::PowerEvent) {
        self.server.on_power_event(event, &mut self.accelerator);
    }

    pub fn calls(&self) -> Vec<HwCall> {
        self.journal.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.journal.borrow_mut().clear();
    }

    // ── Client-side helpers ───────────────────────────────────

    pub fn open_msg(&self, name: &str) -> SharedRegion {
        let msg = EngineOpenMsg::new(name, 0).unwrap();
        self.memory.alloc_with(&msg.to_bytes()).unwrap()
    }

    pub fn try_open_engine(&mut self, conn: ConnectionId) -> (Response, SharedRegion) {
        let msg = self.open_msg("ivahd_vidsvr");
        (self.call(conn, OpCode::OpenEngine, vec![Param::Pointer(msg)]), msg)
    }

    pub fn open_engine(&mut self, conn: ConnectionId) -> EngineHandle {
        let (response, _) = self.try_open_engine(conn);
        assert!(response.is_ok(), "open failed: {response:?}");
        EngineHandle::from_raw(response.result as u32).unwrap()
    }

    pub fn create_params(&self, kind: CodecKind, engine: EngineHandle, height: u32, width: u32) -> Vec<Param> {
        let name = match kind {
            CodecKind::Decode => &b"h264dec\0"[..],
            CodecKind::Encode => &b"h264enc\0"[..],
        };
        vec![
            Param::Scalar(kind.tag()),
            Param::Scalar(engine.raw()),
            Param::Pointer(self.memory.alloc_with(name).unwrap()),
            Param::Pointer(
                self.memory
                    .alloc_with(&StaticParams::encode(kind, height, width))
                    .unwrap(),
            ),
        ]
    }

    pub fn create_codec(&mut self, conn: ConnectionId, kind: CodecKind, engine: EngineHandle) -> CodecHandle {
        let params = self.create_params(kind, engine, 720, 1280);
        let response = self.call(conn, OpCode::CreateCodec, params);
        assert!(response.is_ok(), "create failed: {response:?}");
        CodecHandle::from_raw(response.result as u32).unwrap()
    }

    pub fn control_params(&self, kind: CodecKind, codec: CodecHandle, command: u32) -> (Vec<Param>, SharedRegion) {
        let dyn_params = self.memory.alloc_with(&sized_block(16)).unwrap();
        let status = self
            .memory
            .alloc_with(&StatusHeader::encode(SharedRegion::NULL, 32))
            .unwrap();
        let params = vec![
            Param::Scalar(kind.tag()),
            Param::Scalar(codec.raw()),
            Param::Scalar(command),
            Param::Pointer(dyn_params),
            Param::Pointer(status),
        ];
        (params, status)
    }

    pub fn process_params(
        &self,
        kind: CodecKind,
        codec: CodecHandle,
        in_list: &BufDescList,
        out_list: &BufDescList,
    ) -> (Vec<Param>, SharedRegion) {
        let out_args = self.memory.alloc_with(&encode_out_args(16)).unwrap();
        let params = vec![
            Param::Scalar(kind.tag()),
            Param::Scalar(codec.raw()),
            Param::Inline(in_list.encode().unwrap()),
            Param::Inline(out_list.encode().unwrap()),
            Param::Inline(sized_block(16)),
            Param::Pointer(out_args),
        ];
        (params, out_args)
    }
}

pub fn conn(raw: u32) -> ConnectionId {
    ConnectionId::new(raw).unwrap()
}
