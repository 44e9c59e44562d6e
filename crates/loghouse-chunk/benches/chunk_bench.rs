//! Chunk Performance Benchmarks
//!
//! Measures the three paths that matter on the ingest and query hot
//! loops:
//!
//! 1. **Write** (`chunk_write`): append-until-full including cuts, per
//!    encoding. This is the ingester's per-stream cost.
//! 2. **Read** (`chunk_read`): full forward scan through the buffered
//!    iterator, per encoding.
//! 3. **Backward read** (`chunk_read_backward`): the same scan in
//!    reverse, which additionally materializes each block's frame
//!    table.
//!
//! ## Running
//!
//! ```bash
//! cargo bench -p loghouse-chunk
//! cargo bench -p loghouse-chunk -- chunk_write
//! cargo bench -p loghouse-chunk -- --save-baseline main
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loghouse_chunk::{
    Direction, Encoding, Entry, EntryIterator, HeadFormat, IterContext, MemChunk, NoopPipeline,
};

const BLOCK_SIZE: usize = 256 * 1024;
const TARGET_SIZE: usize = 1536 * 1024;

fn bench_line(i: i64) -> String {
    format!("ts={i} caller=push.go:112 level=debug msg=\"received push request\" entries=32")
}

fn fill(encoding: Encoding) -> (MemChunk, u64) {
    let mut chunk = MemChunk::new(encoding, HeadFormat::Ordered, BLOCK_SIZE, TARGET_SIZE);
    let mut i = 0i64;
    let mut bytes = 0u64;
    loop {
        let entry = Entry::new(i, bench_line(i));
        if !chunk.space_for(&entry) {
            break;
        }
        bytes += entry.line.len() as u64;
        chunk.append(&entry).unwrap();
        i += 1;
    }
    chunk.close().unwrap();
    (chunk, bytes)
}

fn bench_chunk_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_write");
    for encoding in [
        Encoding::None,
        Encoding::Gzip,
        Encoding::Lz4_256k,
        Encoding::Snappy,
        Encoding::Zstd,
    ] {
        let (_, bytes) = fill(encoding);
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(
            BenchmarkId::from_parameter(encoding),
            &encoding,
            |b, &encoding| {
                b.iter(|| {
                    let (chunk, _) = fill(encoding);
                    black_box(chunk);
                });
            },
        );
    }
    group.finish();
}

fn bench_chunk_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_read");
    for encoding in [
        Encoding::None,
        Encoding::Gzip,
        Encoding::Lz4_256k,
        Encoding::Snappy,
        Encoding::Zstd,
    ] {
        let (chunk, bytes) = fill(encoding);
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(
            BenchmarkId::from_parameter(encoding),
            &chunk,
            |b, chunk| {
                b.iter(|| {
                    let mut it = chunk.iterator(
                        IterContext::background(),
                        0,
                        i64::MAX,
                        Direction::Forward,
                        NoopPipeline,
                    );
                    let mut n = 0u64;
                    while it.next() {
                        n += it.entry().line.len() as u64;
                    }
                    it.close();
                    black_box(n);
                });
            },
        );
    }
    group.finish();
}

fn bench_chunk_read_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_read_backward");
    let (chunk, bytes) = fill(Encoding::Snappy);
    group.throughput(Throughput::Bytes(bytes));
    group.bench_function("snappy", |b| {
        b.iter(|| {
            let mut it = chunk.iterator(
                IterContext::background(),
                0,
                i64::MAX,
                Direction::Backward,
                NoopPipeline,
            );
            let mut n = 0u64;
            while it.next() {
                n += it.entry().line.len() as u64;
            }
            it.close();
            black_box(n);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_chunk_write,
    bench_chunk_read,
    bench_chunk_read_backward
);
criterion_main!(benches);
