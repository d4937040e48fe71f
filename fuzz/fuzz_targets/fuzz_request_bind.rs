//! Fuzz target: request decode + signature binding
//!
//! Any payload must either fail to decode, fail to bind with a typed
//! error, or bind to a call. The same bytes also go through the process
//! buffer descriptor decoder. Nothing here may panic.
//!
//! cargo fuzz run fuzz_request_bind

#![no_main]

use dce_server::codec::layout::BufDescList;
use dce_server::rpc::message::Request;
use dce_server::rpc::signature::bind;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(list) = BufDescList::decode(data) {
        assert!(list.encode().is_ok(), "decoded descriptor list must re-encode");
    }

    let Ok(request) = Request::decode(data) else {
        return;
    };
    if let Err(e) = bind(request) {
        assert!(!e.is_fatal(), "binding must never report a fatal error");
    }
});
