//! Per-socket state machine: one TCP or TLS connection, plain or secure,
//! client- or server-side, plus the Acceptor variant that merely calls
//! `accept()` (§3 Connection, §4.5).
//!
//! Generalizes the separate `PlainConnection`/`TlsConnection` structs
//! (each behind a `Connection` trait, one parser type baked in) into a
//! single struct whose protocol state lives in a swappable
//! [`Context`](crate::protocol::Context), matching §3's "Context … Owned
//! by Connection; replaced on protocol upgrade".

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Instant;

use mio::event::Source;
use mio::{Interest, Registry, Token};
use rustls::{ClientConnection, ServerConnection};

use crate::buffer::Buffer;
use crate::error::ConnectionError;
use crate::protocol::Context;
use crate::registry::Transport;

/// Event bits coalesced from epoll plus the synthetic timeout bit the
/// TimerWheel raises (§4.4).
pub mod events {
    /// The socket is readable.
    pub const READABLE: u8 = 0x01;
    /// The socket is writable.
    pub const WRITABLE: u8 = 0x02;
    /// The socket reported an error.
    pub const ERROR: u8 = 0x04;
    /// The peer half-closed or fully hung up.
    pub const HUP: u8 = 0x08;
    /// The Connection's TTL elapsed.
    pub const TIMEOUT: u8 = 0x10;
}

/// Which role this Connection plays (§3 variant tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Calls `accept()` on a listening socket; produces new Connections.
    Acceptor,
    /// Plaintext TCP, this side initiated the connection.
    TcpClientSide,
    /// Plaintext TCP, this side accepted the connection.
    TcpServerSide,
    /// TLS, this side initiated the connection.
    TlsClientSide,
    /// TLS, this side accepted the connection.
    TlsServerSide,
}

/// The socket plus whatever TLS session sits on top of it.
pub enum Medium {
    /// A plain `mio::net::TcpStream`.
    Plain(mio::net::TcpStream),
    /// A TLS session on the accepting side.
    TlsServer(mio::net::TcpStream, Box<ServerConnection>),
    /// A TLS session on the initiating side.
    TlsClient(mio::net::TcpStream, Box<ClientConnection>),
    /// A listening socket, only used by `Variant::Acceptor` Connections.
    Listener(mio::net::TcpListener),
}

impl std::fmt::Debug for Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Medium::Plain(_) => "Medium::Plain",
            Medium::TlsServer(..) => "Medium::TlsServer",
            Medium::TlsClient(..) => "Medium::TlsClient",
            Medium::Listener(_) => "Medium::Listener",
        })
    }
}

/// One socket, tracked by the Reactor (§3 Connection).
#[derive(Debug)]
pub struct Connection {
    /// The Reactor's `Slab` key for this Connection, doubling as the
    /// `mio::Token`.
    pub token: Token,
    /// Which role this Connection plays.
    pub variant: Variant,
    medium: Medium,
    /// The peer's address, if known (acceptors have none meaningful).
    pub peer: Option<SocketAddr>,
    /// Bytes read off the socket, not yet consumed by the protocol driver.
    pub inbound: Buffer,
    /// Bytes the protocol driver has written, not yet flushed to the
    /// socket.
    pub outbound: Buffer,
    /// The protocol-specific state this Connection is driving.
    pub context: Context,
    /// Events observed since the last `process()` call completed.
    pending: u8,
    /// Events that arrived while this Connection was captured; merged
    /// into `pending` on release (§4.4, §5).
    postponed: u8,
    /// Whether a worker currently owns this Connection (§3, §5 invariant 1).
    pub captured: bool,
    /// A fatal error was observed; the connection will close.
    pub error: bool,
    /// The peer has closed its write side (read returned 0).
    pub eof: bool,
    /// This side has shut down its write side (half-close after drain).
    pub no_read: bool,
    /// The TTL elapsed without being renewed.
    pub timed_out: bool,
    /// The Connection should be removed from the Reactor once observed.
    pub closed: bool,
    /// When this Connection's TTL next elapses.
    pub ttl_deadline: Instant,
    /// The Transport that owns this Connection's handler map, held
    /// weakly to avoid the Connection↔Transport ownership cycle (§9
    /// Design Notes).
    pub transport: Weak<Transport>,
    /// The service this Connection is bound to once there is no longer a
    /// per-message path to route on: a WebSocket connection after
    /// upgrade, or any connection on a Packet-kind transport from the
    /// moment it is accepted (§4.10).
    pub bound_service: Option<Arc<dyn crate::service::Service>>,
}

impl Connection {
    /// Wraps a freshly accepted plaintext socket.
    pub fn new_tcp_server(token: Token, stream: mio::net::TcpStream, transport: Weak<Transport>) -> io::Result<Self> {
        let peer = stream.peer_addr().ok();
        Ok(Self {
            token,
            variant: Variant::TcpServerSide,
            medium: Medium::Plain(stream),
            peer,
            inbound: Buffer::new(),
            outbound: Buffer::new(),
            context: Context::new_http(),
            pending: 0,
            postponed: 0,
            captured: false,
            error: false,
            eof: false,
            no_read: false,
            timed_out: false,
            closed: false,
            ttl_deadline: Instant::now() + std::time::Duration::from_secs(5),
            transport,
            bound_service: None,
        })
    }

    /// Wraps a freshly accepted TLS socket, performing no handshake I/O
    /// yet (the first `pump_io` drives it).
    pub fn new_tls_server(
        token: Token,
        stream: mio::net::TcpStream,
        tls: ServerConnection,
        transport: Weak<Transport>,
    ) -> io::Result<Self> {
        let peer = stream.peer_addr().ok();
        Ok(Self {
            token,
            variant: Variant::TlsServerSide,
            medium: Medium::TlsServer(stream, Box::new(tls)),
            peer,
            inbound: Buffer::new(),
            outbound: Buffer::new(),
            context: Context::new_http(),
            pending: 0,
            postponed: 0,
            captured: false,
            error: false,
            eof: false,
            no_read: false,
            timed_out: false,
            closed: false,
            ttl_deadline: Instant::now() + std::time::Duration::from_secs(5),
            transport,
            bound_service: None,
        })
    }

    /// Wraps a connecting (not yet established) client-side plaintext
    /// socket, promoted from a [`crate::net::connector::TcpConnector`].
    pub fn new_tcp_client(token: Token, stream: mio::net::TcpStream, transport: Weak<Transport>) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            token,
            variant: Variant::TcpClientSide,
            medium: Medium::Plain(stream),
            peer,
            inbound: Buffer::new(),
            outbound: Buffer::new(),
            context: Context::new_http(),
            pending: 0,
            postponed: 0,
            captured: false,
            error: false,
            eof: false,
            no_read: false,
            timed_out: false,
            closed: false,
            ttl_deadline: Instant::now() + std::time::Duration::from_secs(30),
            transport,
            bound_service: None,
        }
    }

    /// Wraps a client-side TLS socket.
    pub fn new_tls_client(
        token: Token,
        stream: mio::net::TcpStream,
        tls: ClientConnection,
        transport: Weak<Transport>,
    ) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            token,
            variant: Variant::TlsClientSide,
            medium: Medium::TlsClient(stream, Box::new(tls)),
            peer,
            inbound: Buffer::new(),
            outbound: Buffer::new(),
            context: Context::new_http(),
            pending: 0,
            postponed: 0,
            captured: false,
            error: false,
            eof: false,
            no_read: false,
            timed_out: false,
            closed: false,
            ttl_deadline: Instant::now() + std::time::Duration::from_secs(30),
            transport,
            bound_service: None,
        }
    }

    /// Wraps a listening socket as an Acceptor Connection (§3, §4.5).
    pub fn new_acceptor(token: Token, listener: mio::net::TcpListener, transport: Weak<Transport>) -> Self {
        Self {
            token,
            variant: Variant::Acceptor,
            medium: Medium::Listener(listener),
            peer: None,
            inbound: Buffer::new(),
            outbound: Buffer::new(),
            context: Context::new_status(),
            pending: 0,
            postponed: 0,
            captured: false,
            error: false,
            eof: false,
            no_read: false,
            timed_out: false,
            closed: false,
            ttl_deadline: Instant::now() + std::time::Duration::from_secs(u64::MAX / 2),
            transport,
            bound_service: None,
        }
    }

    /// Merges freshly observed epoll/timeout bits, respecting the
    /// captured/postponed split (§3, §5).
    pub fn merge_event(&mut self, bits: u8) {
        if self.captured {
            self.postponed |= bits;
        } else {
            self.pending |= bits;
        }
    }

    /// Rotates postponed events into the live set; called on release
    /// (§4.4: "events := postponed; postponed := 0").
    pub fn release(&mut self) {
        self.captured = false;
        self.pending = self.postponed;
        self.postponed = 0;
    }

    /// Whether events arrived (directly, or rotated in by `release`) that
    /// still need a `pump_io` pass, so the Reactor should re-queue this
    /// Connection immediately instead of waiting on the next `epoll_wait`.
    pub fn has_pending(&self) -> bool {
        self.pending != 0
    }

    /// The epoll interest this Connection currently wants, derived from
    /// its buffers and (for TLS) handshake state (§4.4 `watch`).
    pub fn desired_interest(&self) -> Interest {
        if self.variant == Variant::Acceptor {
            return Interest::READABLE;
        }

        let want_write = !self.outbound.is_empty()
            || matches!(&self.medium, Medium::TlsServer(_, tls) if tls.wants_write())
            || matches!(&self.medium, Medium::TlsClient(_, tls) if tls.wants_write());
        let want_read = !self.no_read && !self.eof;

        match (want_read, want_write) {
            (true, true) => Interest::READABLE | Interest::WRITABLE,
            (true, false) => Interest::READABLE,
            (false, true) => Interest::WRITABLE,
            (false, false) => Interest::READABLE,
        }
    }

    /// Registers this Connection's socket with `registry`.
    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        let token = self.token;
        let interest = self.desired_interest();
        match &mut self.medium {
            Medium::Plain(s) => s.register(registry, token, interest),
            Medium::TlsServer(s, _) => s.register(registry, token, interest),
            Medium::TlsClient(s, _) => s.register(registry, token, interest),
            Medium::Listener(l) => l.register(registry, token, interest),
        }
    }

    /// Re-registers this Connection's socket after its interest changed.
    pub fn reregister(&mut self, registry: &Registry) -> io::Result<()> {
        let token = self.token;
        let interest = self.desired_interest();
        match &mut self.medium {
            Medium::Plain(s) => s.reregister(registry, token, interest),
            Medium::TlsServer(s, _) => s.reregister(registry, token, interest),
            Medium::TlsClient(s, _) => s.reregister(registry, token, interest),
            Medium::Listener(l) => l.reregister(registry, token, interest),
        }
    }

    /// Deregisters this Connection's socket before it is dropped.
    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match &mut self.medium {
            Medium::Plain(s) => s.deregister(registry),
            Medium::TlsServer(s, _) => s.deregister(registry),
            Medium::TlsClient(s, _) => s.deregister(registry),
            Medium::Listener(l) => l.deregister(registry),
        }
    }

    /// Accepts every pending connection on an Acceptor, until `EAGAIN`
    /// (§4.5 `TcpAcceptor.process()`).
    pub fn accept_all(&mut self) -> io::Result<Vec<(mio::net::TcpStream, SocketAddr)>> {
        let Medium::Listener(listener) = &self.medium else {
            return Ok(Vec::new());
        };
        let mut accepted = Vec::new();
        loop {
            match listener.accept() {
                Ok((stream, addr)) => accepted.push((stream, addr)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(accepted)
    }

    /// Drives the raw I/O loop for a non-acceptor Connection: drains the
    /// outbound buffer, reads into the inbound buffer, and rotates any
    /// events that arrived mid-loop, until no further progress is
    /// possible (§4.5 steps 1-6).
    ///
    /// Returns `true` if any inbound bytes were read (the caller should
    /// then run the protocol driver over the new bytes).
    pub fn pump_io(&mut self) -> Result<bool, ConnectionError> {
        let mut read_progress = false;

        loop {
            if self.timed_out {
                break;
            }
            if self.pending & events::ERROR != 0 {
                self.error = true;
                break;
            }

            let writable = self.pending & events::WRITABLE != 0;
            let readable = self.pending & events::READABLE != 0;

            if writable && !self.outbound.is_empty() {
                self.drain_outbound()?;
            }

            if readable && !self.no_read {
                if self.fill_inbound()? {
                    read_progress = true;
                }
            }

            if !self.outbound.is_empty() && writable {
                self.drain_outbound()?;
            }

            if self.postponed == 0 {
                break;
            }
            self.pending |= self.postponed;
            self.postponed = 0;
        }

        Ok(read_progress)
    }

    fn drain_outbound(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.outbound.is_empty() {
                return Ok(());
            }
            let chunk_len = self.outbound.len().min(4096);
            let chunk = self.outbound.peek(chunk_len).unwrap().to_vec();

            let result = match &mut self.medium {
                Medium::Plain(s) => s.write(&chunk),
                Medium::TlsServer(stream, tls) => {
                    tls.writer().write_all(&chunk).map(|_| chunk.len()).and_then(|n| {
                        tls.write_tls(stream)?;
                        Ok(n)
                    })
                }
                Medium::TlsClient(stream, tls) => {
                    tls.writer().write_all(&chunk).map(|_| chunk.len()).and_then(|n| {
                        tls.write_tls(stream)?;
                        Ok(n)
                    })
                }
                Medium::Listener(_) => return Ok(()),
            };

            match result {
                Ok(0) => return Ok(()),
                Ok(n) => self.outbound.skip(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectionError::Io(e)),
            }
        }
    }

    fn fill_inbound(&mut self) -> Result<bool, ConnectionError> {
        let mut any = false;
        loop {
            self.inbound.reserve(4096);
            let slice = self.inbound.writable_slice();

            // Safety: TLS record-layer reads (`read_tls` then
            // `process_new_packets`) happen before the plaintext read, so
            // the plaintext side never races the record-layer side.
            let result: io::Result<usize> = match &mut self.medium {
                Medium::Plain(s) => s.read(slice),
                Medium::TlsServer(stream, tls) => {
                    match tls.read_tls(stream) {
                        Ok(0) => Ok(0),
                        Ok(_) => match tls.process_new_packets() {
                            Ok(state) if state.plaintext_bytes_to_read() > 0 => tls.reader().read(slice),
                            Ok(_) => Err(io::Error::new(ErrorKind::WouldBlock, "handshaking")),
                            Err(e) => Err(io::Error::new(ErrorKind::InvalidData, e)),
                        },
                        Err(e) => Err(e),
                    }
                }
                Medium::TlsClient(stream, tls) => {
                    match tls.read_tls(stream) {
                        Ok(0) => Ok(0),
                        Ok(_) => match tls.process_new_packets() {
                            Ok(state) if state.plaintext_bytes_to_read() > 0 => tls.reader().read(slice),
                            Ok(_) => Err(io::Error::new(ErrorKind::WouldBlock, "handshaking")),
                            Err(e) => Err(io::Error::new(ErrorKind::InvalidData, e)),
                        },
                        Err(e) => Err(e),
                    }
                }
                Medium::Listener(_) => return Ok(false),
            };

            match result {
                Ok(0) => {
                    self.eof = true;
                    return Ok(any);
                }
                Ok(n) => {
                    self.inbound.advance_put(n);
                    any = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(any),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectionError::Io(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_event_routes_to_postponed_while_captured() {
        let (listener, addr) = local_listener();
        let stream = mio::net::TcpStream::connect(addr).unwrap();
        let mut conn = Connection::new_tcp_server(Token(0), stream, Weak::new()).unwrap();
        drop(listener);

        conn.captured = true;
        conn.merge_event(events::READABLE);
        assert_eq!(conn.pending, 0);
        conn.release();
        assert_eq!(conn.pending, events::READABLE);
    }

    fn local_listener() -> (std::net::TcpListener, SocketAddr) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }
}
