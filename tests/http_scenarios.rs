//! End-to-end HTTP scenarios over real loopback sockets (§8 S1-S3),
//! driving a `Connection` + `Transport` directly rather than through a
//! live `Reactor` — the same raw read/parse/respond path the Reactor
//! triggers, without the nondeterminism of a real `epoll_wait`.

use std::io::Write;
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use conduit::connection::{events, Connection};
use conduit::protocol::http::request::HttpRequest;
use conduit::protocol::http::response::HttpResponse;
use conduit::registry::{Transport, TransportKind};
use conduit::resolver::HostnameResolver;
use conduit::service::{Service, ServiceContext};
use conduit::timer::TimerWheel;
use mio::Token;

struct Echo;

impl Service for Echo {
    fn handle_http(&self, _ctx: &ServiceContext, request: &HttpRequest) -> HttpResponse {
        HttpResponse::new(conduit::protocol::http::response::StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(request.body.clone())
    }
}

/// Accepts one client connection, wraps it as a server-side `Connection`,
/// and pumps I/O until `drive` has produced a full response (or a
/// deadline passes). Returns the bytes written to `outbound`.
fn serve_one(transport: Arc<Transport>, request_bytes: &[u8]) -> (Vec<u8>, bool) {
    let std_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();

    let request_bytes = request_bytes.to_vec();
    let client = thread::spawn(move || {
        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream.write_all(&request_bytes).unwrap();
        // Keep the socket open long enough for the server to read and
        // respond before the client drops it.
        thread::sleep(Duration::from_millis(100));
    });

    let (std_stream, _peer) = std_listener.accept().unwrap();
    std_stream.set_nonblocking(true).unwrap();
    let mio_stream = mio::net::TcpStream::from_std(std_stream);

    let mut conn = Connection::new_tcp_server(Token(0), mio_stream, std::sync::Arc::downgrade(&transport)).unwrap();
    conn.context = transport.initial_context();
    conn.bound_service = transport.bind_initial_service();

    let resolver = HostnameResolver::new();
    let timers = TimerWheel::new();

    let mut produced = false;
    for _ in 0..100 {
        conn.merge_event(events::READABLE);
        let progress = conn.pump_io().unwrap();
        if progress {
            transport.drive(&mut conn, &resolver, &timers);
            if !conn.outbound.is_empty() {
                produced = true;
                break;
            }
        }
        if !produced {
            thread::sleep(Duration::from_millis(5));
        }
    }

    client.join().unwrap();

    let len = conn.outbound.len();
    let bytes = conn.outbound.peek(len).unwrap_or(&[]).to_vec();
    (bytes, conn.no_read)
}

#[test]
fn s1_plain_http_get_is_answered() {
    let mut transport = Transport::new("http", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Http);
    transport.register_http("/", Arc::new(Echo));
    let transport = Arc::new(transport);

    let (response, _close) = serve_one(transport, b"GET / HTTP/1.1\r\nHost: example.org\r\nConnection: close\r\n\r\n");
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {text}");
    assert!(text.contains("Content-Length: 0\r\n"));
}

#[test]
fn s2_oversized_headers_are_rejected() {
    let mut transport = Transport::new("http", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Http);
    transport.register_http("/", Arc::new(Echo));
    let transport = Arc::new(transport);

    let mut request = b"GET / HTTP/1.1\r\nHost: example.org\r\n".to_vec();
    // One 4 KiB+ header line pushes the header region over the cap.
    request.extend_from_slice(b"X-Filler: ");
    request.extend(std::iter::repeat(b'a').take(8192));
    request.extend_from_slice(b"\r\n\r\n");

    let (response, close) = serve_one(transport, &request);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got: {text}");
    let body = text.split("\r\n\r\n").nth(1).unwrap_or("");
    assert!(body.starts_with("Headers data too large"), "got body: {body}");
    assert!(close);
}

#[test]
fn s3_chunked_post_body_is_reassembled() {
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let done = Arc::new(AtomicBool::new(false));

    struct Capture {
        received: Arc<std::sync::Mutex<Vec<u8>>>,
        done: Arc<AtomicBool>,
    }

    impl Service for Capture {
        fn handle_http(&self, _ctx: &ServiceContext, request: &HttpRequest) -> HttpResponse {
            *self.received.lock().unwrap() = request.body.clone();
            self.done.store(true, Ordering::SeqCst);
            HttpResponse::new(conduit::protocol::http::response::StatusCode::OK).body(b"ack".to_vec())
        }
    }

    let mut transport = Transport::new("http", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Http);
    transport.register_http(
        "/upload",
        Arc::new(Capture {
            received: received.clone(),
            done: done.clone(),
        }),
    );
    let transport = Arc::new(transport);

    let body = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
    let mut request = b"POST /upload HTTP/1.1\r\nHost: example.org\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
    request.extend_from_slice(body);

    let (response, _close) = serve_one(transport, &request);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {text}");
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(&*received.lock().unwrap(), b"Wikipedia");
}
