//! Load generator - writes fixed-size records into a shmlog segment
//!
//! Attach with `shmlog-tail <pid>` from another terminal, then press Enter.
//!
//! Usage:
//! ```bash
//! cargo run --example producer -- [count]
//! ```

use shmlog_core::{Producer, ProducerConfig};
use std::io::BufRead;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let count: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 200,
    };

    let mut producer = Producer::create(ProducerConfig::with_capacity(16384))?;
    println!("Created segment for pid {}", producer.identity());
    println!("Press Enter to start writing {} records...", count);
    std::io::stdin().lock().lines().next();

    let started = Instant::now();
    let mut failed = 0;
    for i in 0..count {
        let record = vec![b'0' + (i % 10) as u8; 400];
        if producer.write(&record).is_err() {
            failed += 1;
        }
    }
    let elapsed = started.elapsed();

    let summary = format!(
        "{} records, {} failed, {:.6}s, {:.1}/s",
        count,
        failed,
        elapsed.as_secs_f64(),
        count as f64 / elapsed.as_secs_f64()
    );
    producer.write(summary.as_bytes())?;
    println!("{}", summary);
    Ok(())
}
