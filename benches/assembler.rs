//! Frame assembler benchmark suite.
//!
//! Measures push throughput for the fixed strategies at different chunk
//! sizes, simulating a device streaming short lines or length-prefixed
//! records.
//!
//! Run with: cargo bench --bench assembler
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use device_link::framing::FrameSink;
use device_link::{
    ByteOrder, Frame, FrameAssembler, FramingConfig, ScriptRegistry, ScriptSandbox, SessionId,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const CHUNK_SIZES: &[usize] = &[1, 16, 256];
const STREAM_LEN: usize = 64 * 1024;

// ============================================================================
// Fixtures
// ============================================================================

/// Sink that only counts frames.
fn counting_sink(counter: Arc<AtomicUsize>) -> FrameSink {
    Arc::new(move |_session: SessionId, frames: Vec<Frame>| {
        counter.fetch_add(frames.len(), Ordering::Relaxed);
    })
}

fn assembler(config: FramingConfig, counter: Arc<AtomicUsize>) -> FrameAssembler {
    FrameAssembler::new(
        SessionId::next(),
        config,
        counting_sink(counter),
        Arc::new(ScriptRegistry::new()),
        ScriptSandbox::default(),
    )
}

/// Newline-terminated sensor readings.
fn line_stream() -> Vec<u8> {
    let mut out = Vec::with_capacity(STREAM_LEN);
    let mut n = 0u32;
    while out.len() < STREAM_LEN {
        out.extend_from_slice(format!("TEMP={n},HUM=40\r\n").as_bytes());
        n = n.wrapping_add(1);
    }
    out
}

/// Records with a 2-byte big-endian length header.
fn prefixed_stream() -> Vec<u8> {
    let mut out = Vec::with_capacity(STREAM_LEN);
    let body = [0xA5u8; 30];
    while out.len() < STREAM_LEN {
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(&body);
    }
    out
}

// ============================================================================
// Benchmark: Push Throughput
// ============================================================================

fn bench_strategy(c: &mut Criterion, group_name: &str, config: &FramingConfig, stream: &[u8]) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for &chunk in CHUNK_SIZES {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk_size| {
            b.iter(|| {
                let counter = Arc::new(AtomicUsize::new(0));
                let assembler = assembler(config.clone(), Arc::clone(&counter));
                for (i, piece) in stream.chunks(chunk_size).enumerate() {
                    assembler.push(piece, i as u64);
                }
                assembler.flush();
                counter.load(Ordering::Relaxed)
            });
        });
    }

    group.finish();
}

fn bench_delimiter(c: &mut Criterion) {
    bench_strategy(c, "delimiter", &FramingConfig::delimiter("\\r\\n"), &line_stream());
}

fn bench_prefix_length(c: &mut Criterion) {
    bench_strategy(
        c,
        "prefix_length",
        &FramingConfig::prefix_length(2, ByteOrder::Big),
        &prefixed_stream(),
    );
}

criterion_group!(benches, bench_delimiter, bench_prefix_length);
criterion_main!(benches);
