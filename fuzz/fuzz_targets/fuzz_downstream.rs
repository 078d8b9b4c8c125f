#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Some((start, doc)) = text.split_once('\n') else {
        return;
    };
    if let Ok(graph) = fv_parser::parse(doc) {
        let engine = fv_highlight::HighlightEngine::new(&graph);
        let result = engine.downstream(start);
        // Sorted, deduplicated output is part of the contract.
        assert!(result.nodes.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(result.edges.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(result.nodes.iter().any(|node| node.as_str() == start));
    }
});
