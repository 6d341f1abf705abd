#![no_main]

use html_stream::snapshot::{DomSnapshotOptions, compare_dom};
use html_stream::test_harness::{ChunkPlan, run_chunked};
use html_stream::{StreamConfig, parse_to_node};
use libfuzzer_sys::fuzz_target;
use std::num::NonZeroUsize;

// Byte 0 picks the chunk size, byte 1 the batch size, the rest is markup.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let chunk = usize::from(data[0] % 32) + 1;
    let batch = NonZeroUsize::new(usize::from(data[1] % 8) + 1).unwrap();
    let input = String::from_utf8_lossy(&data[2..]);

    let expected = parse_to_node(&input).unwrap();
    let config = StreamConfig::default().with_batch_size(batch);
    let items = run_chunked(&input, &ChunkPlan::fixed(chunk), config).unwrap();
    let actual = dom_replay::replay_items(items).unwrap().materialize();
    if let Err(mismatch) = compare_dom(&expected, &actual, DomSnapshotOptions::default()) {
        panic!("chunk={chunk} batch={batch}\n{mismatch}");
    }
});
