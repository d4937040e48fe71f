//! Fuzz target: `FrameDecoder::push`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, once
//! whole and once split at the first byte's offset, and checks that both
//! feeds emit the same frames.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use dce_server::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut whole = Vec::new();
    let mut decoder = FrameDecoder::new();
    decoder.push(data, |p| {
        assert!(!p.is_empty(), "decoder must not yield empty payload");
        assert!(p.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
        whole.push(p.to_vec());
    });

    let split = data.first().map_or(0, |&b| usize::from(b).min(data.len()));
    let mut chunked = Vec::new();
    let mut decoder = FrameDecoder::new();
    decoder.push(&data[..split], |p| chunked.push(p.to_vec()));
    decoder.push(&data[split..], |p| chunked.push(p.to_vec()));

    assert_eq!(whole, chunked, "chunking changed the decoded frames");
});
