//! Disconnect sweeper: ordering, idempotence and the fatal idle timeout.

use dce_server::codec::CodecKind;
use dce_server::error::DceError;
use dce_server::registry::RegistryStats;
use dce_server::rpc::SweepReport;

use crate::mock_hw::{HwCall, Rig, conn};

#[test]
fn client_a_open_create_disconnect() {
    let mut rig = Rig::new();
    let a = conn(0xA);
    let e1 = rig.open_engine(a);
    {
        let client = rig.server.registry().find_client(a).unwrap();
        assert_eq!(client.engine_refs(), 1);
        assert_eq!(client.engines().iter().collect::<Vec<_>>(), vec![e1]);
    }

    let k1 = rig.create_codec(a, CodecKind::Decode, e1);
    assert_eq!(
        rig.server.registry().find_client(a).unwrap().codecs(CodecKind::Decode).get(0),
        Some(k1)
    );
    rig.clear_calls();

    let report = rig.disconnect(a).unwrap();
    assert_eq!(
        report,
        SweepReport {
            decoders: 1,
            encoders: 0,
            engines: 1
        }
    );
    assert_eq!(
        rig.calls(),
        vec![
            HwCall::WaitIdle(a),
            HwCall::Delete(CodecKind::Decode, k1),
            HwCall::EngineClose(e1),
        ]
    );
    assert!(rig.server.registry().find_client(a).is_none());
}

#[test]
fn sweep_releases_codecs_before_engines_and_is_idempotent() {
    let mut rig = Rig::new();
    let c = conn(7);
    let engine = rig.open_engine(c);
    let d1 = rig.create_codec(c, CodecKind::Decode, engine);
    let d2 = rig.create_codec(c, CodecKind::Decode, engine);
    let n1 = rig.create_codec(c, CodecKind::Encode, engine);
    rig.clear_calls();

    let report = rig.disconnect(c).unwrap();
    assert_eq!(
        report,
        SweepReport {
            decoders: 2,
            encoders: 1,
            engines: 1
        }
    );
    assert_eq!(
        rig.calls(),
        vec![
            HwCall::WaitIdle(c),
            HwCall::Delete(CodecKind::Decode, d1),
            HwCall::Delete(CodecKind::Decode, d2),
            HwCall::Delete(CodecKind::Encode, n1),
            HwCall::EngineClose(engine),
        ]
    );
    assert!(rig.server.registry().find_client(c).is_none());
    assert_eq!(rig.server.stats(), RegistryStats::default());

    let registry = rig.server.registry().clone();
    rig.clear_calls();
    let second = rig.disconnect(c).unwrap();
    assert!(second.is_empty());
    assert!(rig.calls().is_empty());
    assert_eq!(rig.server.registry(), &registry);
}

#[test]
fn sweep_leaves_other_clients_alone() {
    let mut rig = Rig::new();
    let keep = conn(1);
    let gone = conn(2);
    let kept_engine = rig.open_engine(keep);
    let kept_codec = rig.create_codec(keep, CodecKind::Encode, kept_engine);
    let engine = rig.open_engine(gone);
    rig.create_codec(gone, CodecKind::Encode, engine);

    rig.disconnect(gone).unwrap();
    let client = rig.server.registry().find_client(keep).unwrap();
    assert!(client.engines().contains(kept_engine));
    assert!(client.codecs(CodecKind::Encode).contains(kept_codec));
    assert_eq!(rig.server.stats().clients, 1);
}

#[test]
fn multiple_engines_all_closed() {
    let mut rig = Rig::new();
    let c = conn(5);
    let engines: Vec<_> = (0..3).map(|_| rig.open_engine(c)).collect();
    rig.clear_calls();

    let report = rig.disconnect(c).unwrap();
    assert_eq!(report.engines, 3);
    let closed: Vec<_> = rig
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            HwCall::EngineClose(e) => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(closed, engines);
}

#[test]
fn wedged_accelerator_is_fatal_and_releases_nothing() {
    let mut rig = Rig::new();
    let c = conn(3);
    let engine = rig.open_engine(c);
    rig.create_codec(c, CodecKind::Decode, engine);
    rig.faults.borrow_mut().wedged = true;
    let before = rig.server.registry().clone();
    rig.clear_calls();

    let err = rig.disconnect(c).unwrap_err();
    assert_eq!(err, DceError::AcceleratorWedged);
    assert!(err.is_fatal());
    assert_eq!(rig.calls(), vec![HwCall::WaitIdle(c)]);
    assert_eq!(rig.server.registry(), &before);
}
