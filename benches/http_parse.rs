//! Throughput of the HTTP/1.1 request parser (§4.7) across a small,
//! medium, and header-heavy request, the same shape of bench run against
//! the original method/target/version parser before headers existed.

use conduit::buffer::Buffer;
use conduit::protocol::http::HttpContext;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const REQ_SMALL: &[u8] = b"GET / HTTP/1.1\r\nHost: example.org\r\n\r\n";

const REQ_MEDIUM: &[u8] = b"\
GET /api/v1/widgets?limit=20 HTTP/1.1\r\n\
Host: example.org\r\n\
Accept: */*\r\n\
Accept-Encoding: gzip, deflate, br\r\n\
Accept-Language: en-US,en;q=0.5\r\n\
Connection: keep-alive\r\n\
User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0\r\n\r\n";

const REQ_LARGE: &[u8] = b"\
POST /submit HTTP/1.1\r\n\
Host: example.org\r\n\
User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0\r\n\
Accept: */*\r\n\
Accept-Language: en-US,en;q=0.5\r\n\
Accept-Encoding: gzip, deflate, br\r\n\
Referer: https://example.org/\r\n\
Content-Type: application/x-www-form-urlencoded;charset=utf-8\r\n\
Content-Length: 13\r\n\
Origin: https://example.org\r\n\
Connection: keep-alive\r\n\
Cache-Control: no-cache\r\n\r\nfield=value01";

fn feed(data: &[u8]) {
    let mut ctx = HttpContext::new();
    let mut buf = Buffer::new();
    buf.write(data);
    let _ = black_box(ctx.feed(&mut buf));
}

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("http_parse");
    for (name, data) in [("small", REQ_SMALL), ("medium", REQ_MEDIUM), ("large_with_body", REQ_LARGE)] {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), data, |b, data| {
            b.iter(|| feed(data));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
