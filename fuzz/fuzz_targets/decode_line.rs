#![no_main]

use depstrace::decoder::decode;
use depstrace::joiner::LogicalLine;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Must never panic, whatever the line looks like
        let _ = decode(&LogicalLine {
            number: 1,
            text: text.to_string(),
        });
    }
});
