//! DCE server host entry point.
//!
//! Runs the server against the simulated platform and plays one scripted
//! client session through the mailbox, exactly as a transport would:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  edge_executor::LocalExecutor                                  │
//! │                                                                │
//! │   demo client ──frames──▶ Mailbox ──▶ Worker ──▶ DceServer     │
//! │        ▲                                │          │           │
//! │        └──────── framed responses ◀─────┘          ▼           │
//! │                                                SimPlatform     │
//! │   disconnect notice ──▶ Worker ──▶ sweeper                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The client opens an engine, creates a decoder, drives a few frames and
//! then vanishes without closing anything. The sweeper reclaims it all.

use anyhow::{Context, Result, ensure};
use futures_lite::future;
use log::info;

use dce_server::adapters::sim::{SimMemory, SimPlatform};
use dce_server::codec::layout::{
    ACCESS_READ, BufDescList, BufferDescriptor, EngineOpenMsg, StaticParams, StatusHeader,
    encode_out_args, sized_block,
};
use dce_server::codec::{CodecKind, cmd};
use dce_server::coherency::SharedRegion;
use dce_server::config::ServerConfig;
use dce_server::handle::ConnectionId;
use dce_server::registry::RegistryStats;
use dce_server::rpc::codec::{FrameDecoder, MAX_WIRE_SIZE, encode_frame};
use dce_server::rpc::message::{Param, Request, Response};
use dce_server::rpc::signature::{OpCode, ProcessCall};
use dce_server::rpc::{DceServer, Mailbox, Worker};

const ARENA_SIZE: usize = 256 * 1024;
const DEMO_CONNECTION: u32 = 0x2a;
const DEMO_FRAMES: usize = 3;

fn load_config() -> Result<ServerConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ServerConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    ServerConfig::from_json(&text).with_context(|| format!("parsing {path}"))
}

fn main() -> Result<()> {
    let config = load_config()?;
    // Configured level first so RUST_LOG can still override it.
    let logger = env_logger::Builder::new()
        .filter_level(config.level_filter())
        .parse_default_env()
        .build();
    let max_level = logger.filter();
    log::set_boxed_logger(Box::new(logger)).context("installing logger")?;
    log::set_max_level(max_level);

    info!("╔══════════════════════════════════════╗");
    info!("║  DCE server v{}                   ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let mut platform = SimPlatform::new(ARENA_SIZE);
    let client_memory = platform.memory.clone();
    let mailbox = Mailbox::new();

    let server = DceServer::new(config, SimPlatform::codecs()).context("server config")?;
    let mut worker = Worker::new(server, &mailbox);
    worker.server_mut().connect(&mut platform.accelerator);
    // connect() applies the configured level; a RUST_LOG override wins.
    log::set_max_level(max_level);

    {
        let mut ports = platform.ports();
        let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();
        let serve = async { worker.run(&mut ports).await.context("worker stopped") };
        let session = demo_session(&mailbox, client_memory);
        future::block_on(executor.run(future::or(serve, session)))?;
    }

    let stats = worker.server().stats();
    info!(
        "after sweep: clients={} engines={} decoders={} encoders={}",
        stats.clients, stats.engines, stats.decoders, stats.encoders
    );
    info!(
        "cache maintenance: {} invalidations, {} writebacks; engines still open: {}",
        platform.cache.invalidated,
        platform.cache.written_back,
        platform.engines.open_count()
    );
    ensure!(stats == RegistryStats::default(), "sweep left resources behind");
    Ok(())
}

// ── Demo client ──────────────────────────────────────────────

struct DemoClient<'m> {
    connection: ConnectionId,
    mailbox: &'m Mailbox,
    /// Transport-side decoder for what the client sends.
    inbound: FrameDecoder,
    /// Client-side decoder for what the server answers.
    replies: FrameDecoder,
}

impl DemoClient<'_> {
    async fn call(&mut self, op: OpCode, params: Vec<Param>) -> Result<Response> {
        let payload = Request::new(op, params).encode()?;
        let wire: heapless::Vec<u8, MAX_WIRE_SIZE> = encode_frame(&payload)?;
        ensure!(
            self.mailbox.feed(&mut self.inbound, self.connection, &wire) == 1,
            "{} request dropped",
            op.name()
        );

        let reply = self.mailbox.response().await;
        let mut body = None;
        self.replies.push(&reply.data, |p| body = Some(p.to_vec()));
        let body = body.context("truncated response frame")?;
        let response = Response::decode(&body)?;
        ensure!(response.is_ok(), "{} failed: error {} result {}", op.name(), response.error, response.result);
        Ok(response)
    }
}

async fn demo_session(mailbox: &Mailbox, mem: SimMemory) -> Result<()> {
    let mut client = DemoClient {
        connection: ConnectionId::new(DEMO_CONNECTION).context("connection id")?,
        mailbox,
        inbound: FrameDecoder::new(),
        replies: FrameDecoder::new(),
    };

    // Engine
    let open_msg = mem.alloc_with(&EngineOpenMsg::new("ivahd_vidsvr", 0)?.to_bytes())?;
    let engine = client
        .call(OpCode::OpenEngine, vec![Param::Pointer(open_msg)])
        .await?
        .handle()
        .context("no engine handle")?;
    let echoed = EngineOpenMsg::parse(&mem.peek(open_msg)?)?;
    info!("client: engine {:#x}, error code {}", engine, echoed.error_code);

    // Decoder
    let kind = Param::Scalar(CodecKind::Decode.tag());
    let name = mem.alloc_with(b"h264dec\0")?;
    let params = mem.alloc_with(&StaticParams::encode(CodecKind::Decode, 1080, 1920))?;
    let codec = client
        .call(
            OpCode::CreateCodec,
            vec![kind.clone(), Param::Scalar(engine), Param::Pointer(name), Param::Pointer(params)],
        )
        .await?
        .handle()
        .context("no codec handle")?;
    info!("client: decoder {:#x}", codec);

    // Control + version
    let dyn_params = mem.alloc_with(&sized_block(16))?;
    let status = mem.alloc_with(&StatusHeader::encode(SharedRegion::NULL, 32))?;
    client
        .call(
            OpCode::ControlCodec,
            vec![
                kind.clone(),
                Param::Scalar(codec),
                Param::Scalar(cmd::SET_DEFAULT),
                Param::Pointer(dyn_params),
                Param::Pointer(status),
            ],
        )
        .await?;

    let version_buf = mem.alloc(64)?;
    let version_status = mem.alloc_with(&StatusHeader::encode(version_buf, 32))?;
    client
        .call(
            OpCode::GetCodecVersion,
            vec![
                kind.clone(),
                Param::Scalar(codec),
                Param::Pointer(dyn_params),
                Param::Pointer(version_status),
            ],
        )
        .await?;
    let raw = mem.peek(version_buf)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    info!("client: version {:?}", String::from_utf8_lossy(&raw[..end]));

    // Frames
    let bitstream = mem.alloc(4096)?;
    let picture = mem.alloc(16 * 1024)?;
    let out_args = mem.alloc_with(&encode_out_args(16))?;
    let mut in_list = BufDescList::default();
    let mut out_list = BufDescList::default();
    let _ = in_list.buffers.push(BufferDescriptor {
        region: bitstream,
        access_mask: 0,
    });
    let _ = out_list.buffers.push(BufferDescriptor {
        region: picture,
        access_mask: 0,
    });

    for _ in 0..DEMO_FRAMES {
        let response = client
            .call(
                OpCode::ProcessCodec,
                vec![
                    kind.clone(),
                    Param::Scalar(codec),
                    Param::Inline(in_list.encode()?),
                    Param::Inline(out_list.encode()?),
                    Param::Inline(sized_block(16)),
                    Param::Pointer(out_args),
                ],
            )
            .await?;
        let returned = response
            .inline_at(ProcessCall::IN_BUFS_INDEX)
            .context("no in-buffer list returned")?;
        in_list = BufDescList::decode(returned)?;
    }
    let out = mem.peek(out_args)?;
    info!(
        "client: {} frames decoded, input marked read: {}",
        u32::from_le_bytes([out[8], out[9], out[10], out[11]]),
        in_list.buffers.iter().all(|d| d.access_mask & ACCESS_READ != 0)
    );

    // Vanish without closing anything.
    info!("client: dropping connection with engine and decoder still open");
    ensure!(
        client.mailbox.notify_disconnect(client.connection),
        "disconnect notice dropped"
    );
    future::yield_now().await;
    Ok(())
}
