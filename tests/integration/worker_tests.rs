//! Mailbox + worker on the simulated platform: framing, serialisation of
//! sweeps against requests, and fatal escalation from the async loop.

use dce_server::adapters::sim::SimPlatform;
use dce_server::codec::CodecKind;
use dce_server::codec::layout::{EngineOpenMsg, StaticParams, StatusHeader, sized_block};
use dce_server::codec::cmd;
use dce_server::coherency::SharedRegion;
use dce_server::config::ServerConfig;
use dce_server::error::{DceError, WireError};
use dce_server::handle::ConnectionId;
use dce_server::rpc::codec::{FrameDecoder, MAX_WIRE_SIZE, encode_frame};
use dce_server::rpc::message::{Param, Request, Response};
use dce_server::rpc::signature::OpCode;
use dce_server::rpc::{DceServer, Mailbox, Worker};

use crate::mock_hw::conn;

fn server() -> DceServer {
    DceServer::new(ServerConfig::default(), SimPlatform::codecs()).unwrap()
}

fn submit(mailbox: &Mailbox, c: ConnectionId, op: OpCode, params: Vec<Param>) {
    let payload = Request::new(op, params).encode().unwrap();
    let wire: heapless::Vec<u8, MAX_WIRE_SIZE> = encode_frame(&payload).unwrap();
    let mut inbound = FrameDecoder::new();
    assert_eq!(mailbox.feed(&mut inbound, c, &wire), 1);
}

fn next_response(mailbox: &Mailbox) -> (ConnectionId, Response) {
    let msg = mailbox.try_response().expect("no response queued");
    let mut body = None;
    FrameDecoder::new().push(&msg.data, |p| body = Some(p.to_vec()));
    (msg.connection, Response::decode(&body.unwrap()).unwrap())
}

fn open_params(platform: &SimPlatform) -> Vec<Param> {
    let msg = EngineOpenMsg::new("ivahd_vidsvr", 0).unwrap();
    vec![Param::Pointer(platform.memory.alloc_with(&msg.to_bytes()).unwrap())]
}

#[test]
fn pump_serves_one_framed_request() {
    let mut platform = SimPlatform::new(64 * 1024);
    let mailbox = Mailbox::new();
    let mut worker = Worker::new(server(), &mailbox);

    submit(&mailbox, conn(4), OpCode::OpenEngine, open_params(&platform));
    assert!(worker.pump(&mut platform.ports()).unwrap());
    assert!(!worker.pump(&mut platform.ports()).unwrap());

    let (to, response) = next_response(&mailbox);
    assert_eq!(to, conn(4));
    assert!(response.handle().is_some());
    assert_eq!(worker.server().stats().engines, 1);
    assert_eq!(platform.engines.open_count(), 1);
    assert_eq!(platform.cache.invalidated, platform.cache.written_back);
}

#[test]
fn pending_disconnect_is_swept_before_the_next_command() {
    let mut platform = SimPlatform::new(64 * 1024);
    let mailbox = Mailbox::new();
    let mut worker = Worker::new(server(), &mailbox);
    let c = conn(9);

    submit(&mailbox, c, OpCode::OpenEngine, open_params(&platform));
    worker.pump(&mut platform.ports()).unwrap();
    let engine = next_response(&mailbox).1.handle().unwrap();

    let name = platform.memory.alloc_with(b"mpeg4dec\0").unwrap();
    let params = platform
        .memory
        .alloc_with(&StaticParams::encode(CodecKind::Decode, 480, 640))
        .unwrap();
    submit(
        &mailbox,
        c,
        OpCode::CreateCodec,
        vec![
            Param::Scalar(CodecKind::Decode.tag()),
            Param::Scalar(engine),
            Param::Pointer(name),
            Param::Pointer(params),
        ],
    );
    worker.pump(&mut platform.ports()).unwrap();
    let codec = next_response(&mailbox).1.handle().unwrap();

    // The disconnect is queued after the control request but still wins.
    let dyn_params = platform.memory.alloc_with(&sized_block(16)).unwrap();
    let status = platform
        .memory
        .alloc_with(&StatusHeader::encode(SharedRegion::NULL, 32))
        .unwrap();
    submit(
        &mailbox,
        c,
        OpCode::ControlCodec,
        vec![
            Param::Scalar(CodecKind::Decode.tag()),
            Param::Scalar(codec),
            Param::Scalar(cmd::RESET),
            Param::Pointer(dyn_params),
            Param::Pointer(status),
        ],
    );
    assert!(mailbox.notify_disconnect(c));
    worker.pump(&mut platform.ports()).unwrap();

    let (_, response) = next_response(&mailbox);
    assert_eq!(response.error, DceError::UnknownHandle.code());
    assert!(worker.server().registry().find_client(c).is_none());
    assert_eq!(platform.engines.open_count(), 0);
}

#[test]
fn malformed_parameters_are_answered_with_a_wire_error() {
    let mut platform = SimPlatform::new(4096);
    let mailbox = Mailbox::new();
    let mut worker = Worker::new(server(), &mailbox);

    let payload = Request::new(OpCode::OpenEngine, vec![Param::Scalar(7)])
        .encode()
        .unwrap();
    assert!(mailbox.submit(conn(1), &payload[..payload.len() - 1]));
    assert!(worker.pump(&mut platform.ports()).unwrap());

    let (to, response) = next_response(&mailbox);
    assert_eq!(to, conn(1));
    assert_eq!(response.op, OpCode::OpenEngine);
    assert_eq!(response.error, DceError::Wire(WireError::Malformed).code());
    assert_eq!(response.result, -1);
    assert_eq!(platform.engines.open_count(), 0);
}

#[test]
fn payload_without_an_opcode_gets_no_response() {
    let mut platform = SimPlatform::new(4096);
    let mailbox = Mailbox::new();
    let mut worker = Worker::new(server(), &mailbox);

    assert!(mailbox.submit(conn(1), &[0xFF, 0xFF, 0xFF]));
    assert!(worker.pump(&mut platform.ports()).unwrap());
    assert!(mailbox.try_response().is_none());
}

#[test]
fn run_waits_for_room_instead_of_dropping_replies() {
    let mut platform = SimPlatform::new(64 * 1024);
    let mailbox = Mailbox::new();
    let mut worker = Worker::new(server(), &mailbox);
    let opens: Vec<_> = (0..8).map(|_| open_params(&platform)).collect();

    // Eight requests against a four-deep response queue nobody reads
    // until all of them are in.
    let client = async {
        for (batch, params) in opens.chunks(4).enumerate() {
            for (i, p) in params.iter().enumerate() {
                submit(&mailbox, conn((batch * 4 + i + 1) as u32), OpCode::OpenEngine, p.clone());
            }
            futures_lite::future::yield_now().await;
        }
        let mut replies = Vec::new();
        for _ in 0..8 {
            replies.push(mailbox.response().await.connection);
        }
        replies
    };
    let replies = {
        let mut ports = platform.ports();
        let serve = async {
            let outcome = worker.run(&mut ports).await;
            panic!("worker stopped: {outcome:?}")
        };
        futures_lite::future::block_on(futures_lite::future::or(serve, client))
    };

    assert_eq!(replies, (1..=8).map(conn).collect::<Vec<_>>());
    assert_eq!(worker.server().stats().engines, 8);
}

#[test]
fn run_returns_fatal_sweep_error() {
    let mut platform = SimPlatform::new(64 * 1024);
    let mailbox = Mailbox::new();
    let mut worker = Worker::new(server(), &mailbox);
    let c = conn(2);

    submit(&mailbox, c, OpCode::OpenEngine, open_params(&platform));
    worker.pump(&mut platform.ports()).unwrap();
    assert!(next_response(&mailbox).1.is_ok());

    platform.accelerator.wedged = true;
    assert!(mailbox.notify_disconnect(c));
    let result = futures_lite::future::block_on(worker.run(&mut platform.ports()));
    assert_eq!(result, Err(DceError::AcceleratorWedged));
    assert_eq!(worker.server().stats().engines, 1);
}

#[test]
fn run_serves_commands_until_stopped() {
    let mut platform = SimPlatform::new(64 * 1024);
    let mailbox = Mailbox::new();
    let mut worker = Worker::new(server(), &mailbox);

    submit(&mailbox, conn(6), OpCode::OpenEngine, open_params(&platform));
    submit(&mailbox, conn(7), OpCode::OpenEngine, open_params(&platform));

    let stop = async {
        let first = mailbox.response().await;
        let second = mailbox.response().await;
        (first.connection, second.connection)
    };
    let order = {
        let mut ports = platform.ports();
        let serve = async {
            let outcome = worker.run(&mut ports).await;
            panic!("worker stopped: {outcome:?}")
        };
        futures_lite::future::block_on(futures_lite::future::or(serve, stop))
    };
    assert_eq!(order, (conn(6), conn(7)));
    assert_eq!(worker.server().stats().clients, 2);
}
