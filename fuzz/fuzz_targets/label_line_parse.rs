//! Fuzz target for single-line oriented box conversion.
//!
//! Feeds arbitrary UTF-8 lines to the label line converter, checking for
//! panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use obbkit::label::obb_to_poly::fuzz_convert_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    fuzz_convert_line(line);
});
