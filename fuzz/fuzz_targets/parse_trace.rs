#![no_main]

use depstrace::{DepsParser, ParserConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(parser) = DepsParser::new(ParserConfig::new("/src")) else {
        return;
    };
    // Whole-trace input: joiner, decoder and attribution together
    let _ = parser.parse_reader(text.as_bytes());
});
