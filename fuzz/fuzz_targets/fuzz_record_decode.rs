#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the record codec; errors are fine.
    let _ = seglog::unmarshal(data);
});
