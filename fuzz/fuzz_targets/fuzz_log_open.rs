#![no_main]

use libfuzzer_sys::fuzz_target;
use seglog::{Config, Log};

fuzz_target!(|data: &[u8]| {
    // Arbitrary segment file contents must never panic the open/read path.
    // Opens and reads may fail loudly; they may not crash or hang.
    let tmp = tempfile::tempdir().unwrap();
    let split = data.len() / 2;
    std::fs::write(tmp.path().join("0.store"), &data[..split]).unwrap();
    std::fs::write(tmp.path().join("0.index"), &data[split..]).unwrap();

    if let Ok(log) = Log::open(tmp.path(), Config::default()) {
        for offset in 0..4u64 {
            let _ = log.read(offset);
        }
        let _ = log.close();
    }
});
