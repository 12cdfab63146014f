//! Write/read/compaction throughput for [`Buffer`] (§4.1), the same shape
//! of micro-benchmark run against the original buffer before it was
//! generalized into the Connection inbound/outbound path.

use conduit::buffer::Buffer;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const CHUNK: &[u8] = &[0x42; 1024];

fn write_then_drain(iterations: usize) {
    let mut buf = Buffer::new();
    for _ in 0..iterations {
        buf.write(CHUNK);
        black_box(buf.read(CHUNK.len()));
    }
}

fn write_without_draining(iterations: usize) {
    let mut buf = Buffer::new();
    for _ in 0..iterations {
        buf.write(CHUNK);
    }
    black_box(buf.len());
}

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");
    group.throughput(Throughput::Bytes(CHUNK.len() as u64 * 64));
    group.bench_function("write_then_drain_64", |b| b.iter(|| write_then_drain(64)));
    group.bench_function("write_without_draining_64", |b| b.iter(|| write_without_draining(64)));
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
