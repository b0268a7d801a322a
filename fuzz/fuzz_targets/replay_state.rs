#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use tangle_core::event::parse_lines;
use tangle_core::graph::{apply_events, check_invariants, materialize_from_events};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let Ok(events) = parse_lines(Path::new("fuzz.jsonl"), &text) else {
        return;
    };
    let full = materialize_from_events(&events);
    let mid = events.len() / 2;
    let split = apply_events(materialize_from_events(&events[..mid]), &events[mid..]);
    assert_eq!(full, split);
    let _ = check_invariants(&full);
});
