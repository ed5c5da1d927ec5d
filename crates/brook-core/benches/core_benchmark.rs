//! Benchmark tests for brook-core operations
//!
//! Run with: cargo bench -p brook-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use brook_core::MediaBuffer;

// ============================================================================
// Helpers
// ============================================================================

fn filled_buffer(total: usize, chunk: usize) -> MediaBuffer {
    let mut buffer = MediaBuffer::new();
    buffer.set_total_size(total as u64).unwrap();
    let data = vec![0xabu8; chunk];
    let mut written = 0;
    while written < total {
        let take = chunk.min(total - written);
        buffer.append(&data[..take]);
        written += take;
    }
    buffer
}

// ============================================================================
// Buffer benchmarks
// ============================================================================

fn bench_buffer_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_append");
    for chunk_size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                let chunk = vec![0x5au8; chunk_size];
                b.iter(|| {
                    let mut buffer = MediaBuffer::new();
                    for _ in 0..16 {
                        buffer.append(black_box(&chunk));
                    }
                    black_box(buffer.available())
                });
            },
        );
    }
    group.finish();
}

fn bench_buffer_range_read(c: &mut Criterion) {
    let buffer = filled_buffer(8 * 1024 * 1024, 64 * 1024);

    let mut group = c.benchmark_group("buffer_range_read");
    for read_size in [16 * 1024u64, 256 * 1024, 2 * 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(read_size),
            &read_size,
            |b, &read_size| {
                b.iter(|| {
                    let bytes = buffer
                        .read(black_box(1024), black_box(read_size))
                        .unwrap();
                    black_box(bytes.len())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(buffer_benches, bench_buffer_append, bench_buffer_range_read);
criterion_main!(buffer_benches);
