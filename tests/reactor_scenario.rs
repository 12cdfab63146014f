//! A full Reactor + WorkerPool exercised over real sockets (§8 S6): two
//! concurrent clients hammering the same transport, proving the
//! capture/release discipline (§5 invariant: a Connection is only ever
//! driven by one worker at a time) holds under genuine concurrency rather
//! than a single-threaded manual drive.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use conduit::protocol::http::request::HttpRequest;
use conduit::protocol::http::response::{HttpResponse, StatusCode};
use conduit::reactor::Reactor;
use conduit::registry::{Transport, TransportKind};
use conduit::resolver::HostnameResolver;
use conduit::service::{Service, ServiceContext};
use conduit::task::TaskQueue;
use conduit::timer::TimerWheel;
use conduit::worker::WorkerPool;

struct Counting {
    hits: Arc<AtomicUsize>,
}

impl Service for Counting {
    fn handle_http(&self, _ctx: &ServiceContext, _request: &HttpRequest) -> HttpResponse {
        self.hits.fetch_add(1, Ordering::SeqCst);
        HttpResponse::new(StatusCode::OK).body(b"ok".to_vec())
    }
}

#[test]
fn s6_capture_discipline_holds_under_concurrent_clients() {
    let hits = Arc::new(AtomicUsize::new(0));

    // Reserve a free port, then release it immediately: the Reactor
    // binds the exact address it's given, it does not report back
    // whatever port the OS picked for `:0`.
    let addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let mut transport = Transport::new("http", addr, false, TransportKind::Http);
    transport.register_http("/", Arc::new(Counting { hits: hits.clone() }));
    let transport = Arc::new(transport);

    let tasks = Arc::new(TaskQueue::new());
    let timers = Arc::new(TimerWheel::new());
    let resolver = Arc::new(HostnameResolver::new());
    let pool = WorkerPool::new(4, tasks.clone(), timers.clone());

    let reactor = Reactor::new(tasks, timers, resolver).unwrap();
    // The listening socket is already bound and in its accept backlog
    // once `listen` returns; `start` only kicks off the dispatch task
    // that will notice incoming connections via epoll.
    reactor.listen(transport.clone()).unwrap();
    reactor.start();

    let clients: Vec<_> = (0..8)
        .map(|_| {
            thread::spawn(move || {
                for _ in 0..5 {
                    let mut stream = TcpStream::connect(addr).unwrap();
                    stream
                        .write_all(b"GET / HTTP/1.1\r\nHost: example.org\r\nConnection: close\r\n\r\n")
                        .unwrap();
                    let mut buf = Vec::new();
                    stream.read_to_end(&mut buf).unwrap();
                    let text = String::from_utf8_lossy(&buf);
                    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {text}");
                }
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 40);

    reactor.shutdown();
    thread::sleep(Duration::from_millis(100));
    pool.shutdown();
}
