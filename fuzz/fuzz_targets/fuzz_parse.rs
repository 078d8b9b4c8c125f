#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Parsing must never panic, and every successful result must be
    // JSON-serializable.
    if let Ok(graph) = fv_parser::parse(text) {
        let _ = serde_json::to_string(&graph);
    }
});
