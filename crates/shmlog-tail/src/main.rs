//! shmlog-tail - stream or inspect a producer's shmlog ring buffer
//!
//! Run with: `shmlog-tail [options] <pid>`

use std::io::Write;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use nix::sys::signal::{signal, SigHandler, Signal};
use shmlog_core::{inspect, Consumer, ConsumerConfig, Error, SegmentInfo, MAX_PAYLOAD, SLOT_SIZE};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const IDLE_PAUSE: Duration = Duration::from_millis(10);

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_signal: i32) {
    STOP.store(true, Ordering::SeqCst);
}

#[derive(Parser, Debug)]
#[command(name = "shmlog-tail")]
#[command(about = "Output the records of a process's shmlog ring buffer")]
struct Cli {
    /// Producer process id
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(1..))]
    pid: Option<i32>,

    /// Producer process id, overrides --pid
    #[arg(value_name = "PID", value_parser = clap::value_parser!(i32).range(1..))]
    target: Option<i32>,

    /// Register as the consumer. Fewer records are lost, but a full buffer
    /// slows the producer's writes down.
    #[arg(short, long)]
    block: bool,

    /// Drop queued records to catch up when the buffer is nearly full
    #[arg(short, long)]
    drop: bool,

    /// Print segment information and exit
    #[arg(short, long)]
    info: bool,
}

/// Counters reported on exit
#[derive(Debug, Default)]
struct Totals {
    read: u64,
    lost: u64,
    lost_events: u64,
    dropped: u64,
}

impl Totals {
    fn record(&mut self, lost: usize) {
        self.read += 1;
        self.lost += lost as u64;
        if lost > 0 {
            self.lost_events += 1;
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version go to stdout and are not failures.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let pid = match (cli.pid, cli.target) {
        (Some(previous), Some(pid)) => {
            warn!("pid {} is overridden by {}", previous, pid);
            pid
        }
        (Some(pid), None) | (None, Some(pid)) => pid,
        (None, None) => {
            error!("pid is not specified");
            return ExitCode::FAILURE;
        }
    };

    if cli.info {
        return match inspect(pid) {
            Ok(info) => {
                print_info(&info);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("cannot inspect pid {}: {}", pid, e);
                ExitCode::FAILURE
            }
        };
    }

    match tail(pid, &cli) {
        Ok(totals) => {
            info!(
                "total read {} records, total lost {} records in {} times, total drop {} records",
                totals.read, totals.lost, totals.lost_events, totals.dropped
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_info(info: &SegmentInfo) {
    println!("pid: {}", info.identity);
    println!("segment: {} ({} bytes)", info.name, info.size);
    println!("capacity: {} x {} bytes", info.capacity, SLOT_SIZE);
    if info.consumer_id > 0 {
        println!("consumer: {}", info.consumer_id);
    } else {
        println!("consumer: none");
    }
    println!("head: {}", info.head);
    println!("tail: {}", info.tail);
}

fn tail(pid: i32, cli: &Cli) -> Result<Totals, Box<dyn std::error::Error>> {
    let config = if cli.block {
        ConsumerConfig::blocking()
    } else {
        ConsumerConfig::non_blocking()
    };
    let mut consumer =
        Consumer::attach(pid, config).map_err(|e| format!("cannot attach to pid {}: {}", pid, e))?;
    info!(pid, capacity = consumer.capacity(), block = cli.block, "tailing");

    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // Safety: the handler only stores to an atomic.
        if let Err(e) = unsafe { signal(sig, SigHandler::Handler(request_stop)) } {
            warn!("cannot install {:?} handler: {}", sig, e);
        }
    }

    let capacity = consumer.capacity();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut buf = [0u8; MAX_PAYLOAD];
    let mut totals = Totals::default();

    while !STOP.load(Ordering::SeqCst) {
        match consumer.read(&mut buf, Some(READ_TIMEOUT)) {
            Ok(read) => {
                totals.record(read.lost);
                if cli.drop && consumer.remaining() * 3 > capacity * 2 {
                    let dropped = drain(&mut consumer, capacity, &mut totals)?;
                    warn!("drop {} records", dropped);
                    totals.dropped += dropped;
                } else {
                    out.write_all(&buf[..read.len])?;
                    out.write_all(b"\n")?;
                }
            }
            Err(Error::Timeout) => {
                out.flush()?;
                thread::sleep(IDLE_PAUSE);
            }
            Err(e) => return Err(e.into()),
        }
    }

    out.flush()?;
    consumer.detach();
    Ok(totals)
}

/// Release queued records unread until the buffer is at most a third full.
fn drain(
    consumer: &mut Consumer,
    capacity: usize,
    totals: &mut Totals,
) -> shmlog_core::Result<u64> {
    let mut dropped = 0;
    while consumer.remaining() * 3 >= capacity {
        match consumer.zero_copy_read(Some(Duration::ZERO)) {
            Ok(guard) => {
                totals.record(guard.lost());
                guard.release();
                dropped += 1;
            }
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional_pid() {
        let cli = Cli::try_parse_from(["shmlog-tail", "-b", "1234"]).unwrap();
        assert_eq!(cli.target, Some(1234));
        assert!(cli.block);
        assert!(!cli.drop);
    }

    #[test]
    fn test_parse_rejects_non_positive_pid() {
        assert!(Cli::try_parse_from(["shmlog-tail", "-p", "0"]).is_err());
        assert!(Cli::try_parse_from(["shmlog-tail", "--pid", "-5"]).is_err());
    }

    #[test]
    fn test_totals() {
        let mut totals = Totals::default();
        totals.record(0);
        totals.record(3);
        totals.record(2);
        assert_eq!(totals.read, 3);
        assert_eq!(totals.lost, 5);
        assert_eq!(totals.lost_events, 2);
    }
}
