//! Performance benchmarks for shmlog
//!
//! Run with: cargo bench --package shmlog-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shmlog_core::{Consumer, ConsumerConfig, Producer, ProducerConfig, Segment, MAX_PAYLOAD};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

fn unique_identity() -> i32 {
    static NEXT: AtomicI32 = AtomicI32::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let identity = (1 << 26) + (std::process::id() % 100_000) as i32 * 100 + n;
    Segment::unlink(identity).unwrap();
    identity
}

fn producer(capacity: usize) -> Producer {
    Producer::create(ProducerConfig {
        identity: Some(unique_identity()),
        ..ProducerConfig::with_capacity(capacity)
    })
    .unwrap()
}

fn bench_segment_create(c: &mut Criterion) {
    c.bench_function("segment_create", |b| {
        b.iter(|| {
            let producer = producer(1024);
            black_box(producer);
        });
    });
}

fn bench_write_overwrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_overwrite");

    for size in [16, 64, MAX_PAYLOAD].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            // No consumer registered: a full buffer overwrites immediately.
            let mut producer = producer(16384);
            let data = vec![b'x'; size];
            b.iter(|| {
                black_box(producer.write(&data).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_read");

    for size in [16, 64, MAX_PAYLOAD].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut producer = producer(1024);
            let mut consumer =
                Consumer::attach(producer.identity(), ConsumerConfig::non_blocking()).unwrap();
            let data = vec![b'x'; size];
            let mut buf = [0u8; MAX_PAYLOAD];

            b.iter(|| {
                producer.write(&data).unwrap();
                let read = consumer.read(&mut buf, Some(Duration::ZERO)).unwrap();
                black_box(read);
            });
        });
    }
    group.finish();
}

fn bench_zero_copy(c: &mut Criterion) {
    let mut producer = producer(1024);
    let mut consumer =
        Consumer::attach(producer.identity(), ConsumerConfig::non_blocking()).unwrap();
    let data = vec![b'x'; MAX_PAYLOAD];

    c.bench_function("write_zero_copy_read", |b| {
        b.iter(|| {
            producer.write(&data).unwrap();
            let guard = consumer.zero_copy_read(Some(Duration::ZERO)).unwrap();
            let sum: u64 = guard.as_bytes().iter().map(|&x| x as u64).sum();
            black_box(sum);
        });
    });
}

criterion_group!(
    benches,
    bench_segment_create,
    bench_write_overwrite,
    bench_write_read,
    bench_zero_copy
);
criterion_main!(benches);
