#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use tangle_core::event::{decode_line, encode_line};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    // Anything that decodes must survive a re-encode unchanged.
    if let Ok(event) = decode_line(Path::new("fuzz.jsonl"), 1, raw) {
        let line = encode_line(&event).expect("decoded events encode");
        let again = decode_line(Path::new("fuzz.jsonl"), 1, line.trim_end()).expect("re-decode");
        assert_eq!(event, again);
    }
});
