//! WebSocket handshake, echo, and ping/pong scenarios over a real
//! loopback socket (§8 S4-S5).
//!
//! The server side here is driven the same way `http_scenarios.rs`
//! drives one: only the `READABLE` bit is ever merged, so `pump_io`
//! never attempts to flush `outbound` over the wire (that needs
//! `WRITABLE` too, which nothing here ever signals). Assertions read the
//! server's `outbound` buffer directly instead of reading the client's
//! socket, and the client writes its whole byte sequence (handshake
//! request plus one WebSocket frame) in a single `write_all` so nothing
//! on the client side ever blocks waiting for a response that the server
//! never actually sends over the socket.

use std::io::Write;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use conduit::buffer::Buffer;
use conduit::connection::{events, Connection};
use conduit::protocol::websocket::frame::{Frame, Opcode};
use conduit::registry::{Transport, TransportKind};
use conduit::resolver::HostnameResolver;
use conduit::service::{Service, ServiceContext};
use conduit::timer::TimerWheel;
use mio::Token;

struct Bounce;

impl Service for Bounce {
    fn handle_ws(&self, _ctx: &ServiceContext, frame: &Frame) -> Vec<Frame> {
        vec![Frame::unmasked(frame.opcode, frame.payload.clone())]
    }
}

/// Accepts one client connection, drives the server side of it over
/// several read-only pump rounds, and returns whatever ended up in the
/// server's outbound buffer.
fn run_server(transport: Arc<Transport>, request_bytes: Vec<u8>) -> Vec<u8> {
    let std_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();

    let client = thread::spawn(move || {
        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream.write_all(&request_bytes).unwrap();
        thread::sleep(Duration::from_millis(150));
    });

    let (std_stream, _peer) = std_listener.accept().unwrap();
    std_stream.set_nonblocking(true).unwrap();
    let mio_stream = mio::net::TcpStream::from_std(std_stream);

    let mut conn = Connection::new_tcp_server(Token(0), mio_stream, Arc::downgrade(&transport)).unwrap();
    conn.context = transport.initial_context();
    conn.bound_service = transport.bind_initial_service();

    let resolver = HostnameResolver::new();
    let timers = TimerWheel::new();

    for _ in 0..100 {
        conn.merge_event(events::READABLE);
        let progress = conn.pump_io().unwrap_or(false);
        if progress {
            transport.drive(&mut conn, &resolver, &timers);
        }
        thread::sleep(Duration::from_millis(5));
    }

    client.join().unwrap();

    let len = conn.outbound.len();
    conn.outbound.peek(len).unwrap_or(&[]).to_vec()
}

fn handshake_request(key: &str) -> Vec<u8> {
    format!(
        "GET /chat HTTP/1.1\r\n\
         Host: example.org\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    )
    .into_bytes()
}

fn masked_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut out = Buffer::new();
    Frame::unmasked(opcode, payload.to_vec()).write_masked(&mut out);
    let len = out.len();
    out.read(len).unwrap().to_vec()
}

#[test]
fn s4_handshake_and_echo_round_trip() {
    let mut transport = Transport::new("ws", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Http);
    transport.register_http("/chat", Arc::new(Bounce));
    let transport = Arc::new(transport);

    let key = base64::engine::general_purpose::STANDARD.encode(b"the sample nonce");
    let expected_accept = conduit::protocol::websocket::WsContext::accept_key(&key);

    let mut request = handshake_request(&key);
    request.extend(masked_frame(Opcode::Text, b"hello"));

    let output = run_server(transport, request);

    let text_head = String::from_utf8_lossy(&output[..output.len().min(400)]);
    assert!(text_head.starts_with("HTTP/1.1 101"), "got: {text_head}");
    assert!(text_head.contains(&format!("Sec-WebSocket-Accept: {expected_accept}")), "got: {text_head}");

    let echoed = find_unmasked_frame(&output, Opcode::Text, b"hello");
    assert!(echoed, "expected an echoed text frame in: {output:?}");
}

#[test]
fn s5_ping_is_answered_with_pong() {
    let mut transport = Transport::new("ws", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Http);
    transport.register_http("/chat", Arc::new(Bounce));
    let transport = Arc::new(transport);

    let key = base64::engine::general_purpose::STANDARD.encode(b"another test nonce");

    let mut request = handshake_request(&key);
    request.extend(masked_frame(Opcode::Ping, b"ping-payload"));

    let output = run_server(transport, request);

    let ponged = find_unmasked_frame(&output, Opcode::Pong, b"ping-payload");
    assert!(ponged, "expected a Pong frame echoing the ping payload in: {output:?}");
}

#[test]
fn s7_unrouted_upgrade_target_closes_with_1008() {
    let mut transport = Transport::new("ws", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Http);
    transport.register_http("/chat", Arc::new(Bounce));
    let transport = Arc::new(transport);

    let key = base64::engine::general_purpose::STANDARD.encode(b"yet another nonce");
    let request = handshake_request_for(&key, "/no-such-route");

    let output = run_server(transport, request);

    let text_head = String::from_utf8_lossy(&output[..output.len().min(400)]);
    assert!(text_head.starts_with("HTTP/1.1 101"), "got: {text_head}");

    let closed = find_close_frame(&output, 1008);
    assert!(closed, "expected a 1008 close frame in: {output:?}");
}

fn handshake_request_for(key: &str, target: &str) -> Vec<u8> {
    format!(
        "GET {target} HTTP/1.1\r\n\
         Host: example.org\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    )
    .into_bytes()
}

fn find_close_frame(data: &[u8], expected_code: u16) -> bool {
    for start in 0..data.len() {
        if let Some((opcode, payload)) = try_parse_at(data, start) {
            if opcode == Opcode::Close && payload.len() >= 2 {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if code == expected_code {
                    return true;
                }
            }
        }
    }
    false
}

/// Scans raw bytes for an unmasked (server-originated) frame with the
/// given opcode and payload, tolerating other bytes (handshake headers)
/// preceding it in the same blob.
fn find_unmasked_frame(data: &[u8], opcode: Opcode, payload: &[u8]) -> bool {
    for start in 0..data.len() {
        if let Some((found_opcode, found_payload)) = try_parse_at(data, start) {
            if found_opcode == opcode && found_payload == payload {
                return true;
            }
        }
    }
    false
}

/// Best-effort unmasked-frame parse starting at `start`, used only to
/// locate frames inside a byte blob that also contains HTTP headers.
fn try_parse_at(data: &[u8], start: usize) -> Option<(Opcode, Vec<u8>)> {
    let bytes = &data[start..];
    if bytes.len() < 2 {
        return None;
    }
    if bytes[0] & 0x80 == 0 {
        return None; // expects FIN set; this engine never fragments.
    }
    let opcode = match bytes[0] & 0x0F {
        0x1 => Opcode::Text,
        0x2 => Opcode::Binary,
        0x8 => Opcode::Close,
        0x9 => Opcode::Ping,
        0xA => Opcode::Pong,
        _ => return None,
    };
    if bytes[0] & 0x70 != 0 {
        return None;
    }
    let masked = bytes[1] & 0x80 != 0;
    if masked {
        return None; // server-originated frames are always unmasked.
    }
    let base_len = (bytes[1] & 0x7F) as usize;
    let mut offset = 2usize;
    let payload_len = match base_len {
        126 => {
            if bytes.len() < 4 {
                return None;
            }
            offset = 4;
            u16::from_be_bytes([bytes[2], bytes[3]]) as usize
        }
        127 => return None,
        n => n,
    };
    if bytes.len() < offset + payload_len {
        return None;
    }
    Some((opcode, bytes[offset..offset + payload_len].to_vec()))
}
