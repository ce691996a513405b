#![no_main]

use asterix_receiver::CaptureFilter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = CaptureFilter::compile(input);
    }
});
