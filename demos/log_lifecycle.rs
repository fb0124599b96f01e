//! Minimal walkthrough of the log lifecycle: append, read, rotate, truncate.
//!
//! Run:
//! `cargo run --example log_lifecycle`

use seglog::{Config, Log, Record};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let log = Log::open(tmp.path(), Config::default())?;

    // The default config rotates after three records per segment, so ten
    // appends exercise rotation several times.
    for i in 0..10 {
        let mut record = Record::new(format!("record-{i}").into_bytes());
        let offset = log.append(&mut record)?;
        println!("appended offset {offset}");
    }

    println!(
        "offsets {}..={}",
        log.lowest_offset()?,
        log.highest_offset()?
    );

    let record = log.read(7)?;
    println!("read offset 7: {}", String::from_utf8_lossy(&record.value));

    log.truncate(4)?;
    println!("after truncate(4): lowest = {}", log.lowest_offset()?);

    log.close()?;
    Ok(())
}
