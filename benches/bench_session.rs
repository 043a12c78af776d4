// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Benchmarks for the framing layer and full sessions.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gzip_fpga::drain::compress_all;
use gzip_fpga::{
    CompressionMode, CompressionSession, Emulator, FrameAccumulator, SessionConfig,
};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);

fn sample(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i * 7) % 61) as u8 + b' ').collect()
}

/// Benchmark frame accumulation with a sink that discards frames.
fn bench_framing(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![
        4 * 1024,        // 4 KB
        64 * 1024,       // 64 KB
        1024 * 1024,     // 1 MB
        4 * 1024 * 1024, // 4 MB
    ];

    let mut group = c.benchmark_group("framing");

    for size in sizes {
        let data = sample(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("accumulate", size), &data, |b, data| {
            b.iter(|| {
                let mut acc = FrameAccumulator::new();
                let mut frames = 0usize;
                for chunk in data.chunks(4096) {
                    frames += acc.push(chunk, |_| Ok(())).unwrap();
                }
                acc.finish(|_| Ok(())).unwrap();
                frames
            });
        });
    }

    group.finish();
}

/// Benchmark whole sessions: software core per mode, hardware core if present.
fn bench_session(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![
        64 * 1024,   // 64 KB
        1024 * 1024, // 1 MB
    ];

    let mut group = c.benchmark_group("session");
    group.sample_size(10);

    for size in sizes {
        let data = sample(size);
        group.throughput(Throughput::Bytes(size as u64));

        for mode in [
            CompressionMode::NoCompression,
            CompressionMode::FixedHuffman,
            CompressionMode::DynamicHuffman,
        ] {
            let emulator = Emulator::new();
            let mut session = emulator.session(SessionConfig::new(mode)).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("emulated/{}", mode.name()), size),
                &data,
                |b, data| {
                    b.iter(|| compress_all(&mut session, data, TIMEOUT).unwrap());
                },
            );
        }

        // Hardware core (only if available)
        if gzip_fpga::core_available_default() {
            if let Ok(mut session) = CompressionSession::open(SessionConfig::default()) {
                group.bench_with_input(BenchmarkId::new("fpga", size), &data, |b, data| {
                    b.iter(|| compress_all(&mut session, data, TIMEOUT).unwrap());
                });
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_framing, bench_session);
criterion_main!(benches);
