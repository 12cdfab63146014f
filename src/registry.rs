//! Path-routed service registry and the protocol-driving glue that sits
//! between a Connection's raw buffers and the handlers registered on it
//! (§4.10). Grounded on `multilistener.rs`'s `MultiListener::event()`,
//! which left the routing seam as an explicit TODO; this is what fills
//! it in.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::ServerConfig;

use crate::connection::Connection;
use crate::protocol::http::request::{HttpRequest, Version};
use crate::protocol::http::response::{HttpResponse, StatusCode};
use crate::protocol::websocket::{self, Opcode, WsContext};
use crate::protocol::Context;
use crate::resolver::HostnameResolver;
use crate::service::{Service, ServiceContext};
use crate::timer::TimerWheel;

/// Which protocol a Transport's freshly accepted connections speak before
/// any upgrade. HTTP transports may still upgrade a given path to
/// WebSocket; Packet transports never run HTTP framing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// HTTP/1.1, with optional per-path WebSocket upgrade.
    Http,
    /// 16-bit length-prefixed packets, routed to a single service.
    Packet,
}

/// One listening address plus the services routed on it (§4.10, §6
/// `transports[]`).
pub struct Transport {
    /// The configured name, for logging.
    pub name: String,
    /// The address this transport listens on.
    pub addr: SocketAddr,
    /// Whether accepted connections should be wrapped in TLS.
    pub secure: bool,
    /// The TLS server configuration, required when `secure` is set.
    pub tls_server_config: Option<Arc<ServerConfig>>,
    /// What protocol freshly accepted connections start in.
    pub kind: TransportKind,
    routes: Vec<(String, Arc<dyn Service>)>,
    packet_service: Option<Arc<dyn Service>>,
}

impl Transport {
    /// A transport with no routes registered yet.
    pub fn new(name: impl Into<String>, addr: SocketAddr, secure: bool, kind: TransportKind) -> Self {
        Self {
            name: name.into(),
            addr,
            secure,
            tls_server_config: None,
            kind,
            routes: Vec::new(),
            packet_service: None,
        }
    }

    /// Supplies the TLS server configuration for a secure transport.
    pub fn with_tls(mut self, config: Arc<ServerConfig>) -> Self {
        self.tls_server_config = Some(config);
        self
    }

    /// Registers `handler` for every HTTP request whose target starts
    /// with `prefix` (longest prefix wins at lookup time). Also used for
    /// the target path of a WebSocket upgrade.
    pub fn register_http(&mut self, prefix: impl Into<String>, handler: Arc<dyn Service>) {
        self.routes.push((prefix.into(), handler));
    }

    /// Registers the single handler a Packet-kind transport hands every
    /// accepted connection.
    pub fn register_packet(&mut self, handler: Arc<dyn Service>) {
        self.packet_service = Some(handler);
    }

    /// The longest registered prefix that `path` starts with, if any
    /// (§4.10 "longest matching path prefix wins").
    pub fn lookup(&self, path: &str) -> Option<&Arc<dyn Service>> {
        self.routes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| handler)
    }

    /// The Context a freshly accepted connection on this transport
    /// starts in.
    pub fn initial_context(&self) -> Context {
        match self.kind {
            TransportKind::Http => Context::new_http(),
            TransportKind::Packet => Context::new_packet(),
        }
    }

    /// The service a freshly accepted connection is already bound to,
    /// for Packet-kind transports where there is no per-request path to
    /// route on.
    pub fn bind_initial_service(&self) -> Option<Arc<dyn Service>> {
        match self.kind {
            TransportKind::Http => None,
            TransportKind::Packet => self.packet_service.clone(),
        }
    }

    /// Feeds every byte currently sitting in `conn.inbound` through its
    /// protocol Context, dispatching complete requests/messages to the
    /// routed service and writing responses to `conn.outbound`, until no
    /// further progress is possible.
    pub fn drive(&self, conn: &mut Connection, resolver: &HostnameResolver, timers: &TimerWheel) {
        let peer = conn.peer;
        loop {
            let outcome = match &mut conn.context {
                Context::Http(ctx) => {
                    self.drive_http(ctx, &mut conn.inbound, &mut conn.outbound, peer, resolver, timers)
                }
                Context::Ws(ctx) => {
                    self.drive_ws(ctx, &mut conn.inbound, &mut conn.outbound, peer, resolver, timers, &conn.bound_service)
                }
                Context::Packet(ctx) => {
                    self.drive_packet(ctx, &mut conn.inbound, &mut conn.outbound, peer, resolver, timers, &conn.bound_service)
                }
                Context::Status(_) => DriveOutcome::NeedMore,
            };

            match outcome {
                DriveOutcome::NeedMore => break,
                DriveOutcome::Continue => continue,
                DriveOutcome::Upgrade(new_context, bound_service) => {
                    conn.context = new_context;
                    conn.bound_service = bound_service;
                    continue;
                }
                DriveOutcome::Close => {
                    conn.no_read = true;
                    break;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn drive_http(
        &self,
        ctx: &mut crate::protocol::http::HttpContext,
        inbound: &mut crate::buffer::Buffer,
        outbound: &mut crate::buffer::Buffer,
        peer: Option<SocketAddr>,
        resolver: &HostnameResolver,
        timers: &TimerWheel,
    ) -> DriveOutcome {
        if let Some(data) = inbound.peek(websocket::POLICY_FILE_REQUEST.len()) {
            if data == websocket::POLICY_FILE_REQUEST {
                inbound.skip(websocket::POLICY_FILE_REQUEST.len());
                outbound.write(websocket::POLICY_FILE_RESPONSE);
                return DriveOutcome::Close;
            }
        }

        match ctx.feed(inbound) {
            Ok(None) => {
                if ctx.wants_100_continue() {
                    HttpResponse::new(StatusCode::CONTINUE).write_to(Version::Http11, outbound);
                    ctx.mark_100_continue_sent();
                }
                DriveOutcome::NeedMore
            }
            Ok(Some(request)) => {
                if is_websocket_upgrade(&request) {
                    let path = request_path(&request);
                    let bound = self.lookup(path).cloned();
                    match WsContext::handshake_server(&request) {
                        Ok((ws_ctx, response)) => {
                            response.write_to(request.version, outbound);
                            if bound.is_none() {
                                // §4.10: no route for this target closes with 1008.
                                websocket::close_frame(1008, "").write_to(outbound, None);
                                DriveOutcome::Close
                            } else {
                                DriveOutcome::Upgrade(Context::Ws(ws_ctx), bound)
                            }
                        }
                        Err(response) => {
                            response.write_to(request.version, outbound);
                            DriveOutcome::Close
                        }
                    }
                } else {
                    let response = match self.lookup(request_path(&request)) {
                        Some(handler) => {
                            let sctx = ServiceContext { peer, resolver, timers };
                            handler.handle_http(&sctx, &request)
                        }
                        None => HttpResponse::not_found(),
                    };
                    let close = response.close_after_send;
                    response.write_to(request.version, outbound);
                    if close {
                        DriveOutcome::Close
                    } else {
                        DriveOutcome::Continue
                    }
                }
            }
            Err(crate::error::ParseError::HeadersTooLarge) => {
                HttpResponse::bad_request("Headers data too large").write_to(Version::Http11, outbound);
                DriveOutcome::Close
            }
            Err(_) => {
                HttpResponse::bad_request("Bad Request").write_to(Version::Http11, outbound);
                DriveOutcome::Close
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn drive_ws(
        &self,
        ctx: &mut WsContext,
        inbound: &mut crate::buffer::Buffer,
        outbound: &mut crate::buffer::Buffer,
        peer: Option<SocketAddr>,
        resolver: &HostnameResolver,
        timers: &TimerWheel,
        bound_service: &Option<Arc<dyn Service>>,
    ) -> DriveOutcome {
        match ctx.feed(inbound) {
            Ok((delivered, replies)) => {
                for reply in &replies {
                    reply.write_to(outbound, None);
                }
                let mut saw_close = false;
                if let Some(handler) = bound_service {
                    let sctx = ServiceContext { peer, resolver, timers };
                    for frame in &delivered {
                        match frame.opcode {
                            Opcode::Close => saw_close = true,
                            Opcode::Text | Opcode::Binary => {
                                for out_frame in handler.handle_ws(&sctx, frame) {
                                    out_frame.write_to(outbound, None);
                                }
                            }
                            Opcode::Ping | Opcode::Pong => {}
                        }
                    }
                } else {
                    saw_close = delivered.iter().any(|f| f.opcode == Opcode::Close);
                }

                if saw_close {
                    DriveOutcome::Close
                } else if delivered.is_empty() {
                    DriveOutcome::NeedMore
                } else {
                    DriveOutcome::Continue
                }
            }
            Err(err) => {
                websocket::close_frame_for_error(&err).write_to(outbound, None);
                DriveOutcome::Close
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn drive_packet(
        &self,
        ctx: &mut crate::protocol::packet::PacketContext,
        inbound: &mut crate::buffer::Buffer,
        outbound: &mut crate::buffer::Buffer,
        peer: Option<SocketAddr>,
        resolver: &HostnameResolver,
        timers: &TimerWheel,
        bound_service: &Option<Arc<dyn Service>>,
    ) -> DriveOutcome {
        let messages = ctx.feed(inbound);
        if messages.is_empty() {
            return DriveOutcome::NeedMore;
        }
        if let Some(handler) = bound_service {
            let sctx = ServiceContext { peer, resolver, timers };
            for message in &messages {
                if let Some(reply) = handler.handle_packet(&sctx, message) {
                    crate::protocol::packet::PacketContext::write_message(outbound, &reply);
                }
            }
        }
        DriveOutcome::Continue
    }
}

enum DriveOutcome {
    NeedMore,
    Continue,
    Upgrade(Context, Option<Arc<dyn Service>>),
    Close,
}

fn is_websocket_upgrade(request: &HttpRequest) -> bool {
    request
        .header("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn request_path(request: &HttpRequest) -> &str {
    request.target.split('?').next().unwrap_or(&request.target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        struct Stub;
        impl Service for Stub {}

        let mut transport = Transport::new("http", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Http);
        transport.register_http("/api", Arc::new(Stub));
        transport.register_http("/api/v2", Arc::new(Stub));

        assert!(transport.lookup("/api/v2/widgets").is_some());
        assert!(transport.lookup("/other").is_none());
    }

    #[test]
    fn packet_transport_has_no_http_routes() {
        let transport = Transport::new("pkt", "127.0.0.1:0".parse().unwrap(), false, TransportKind::Packet);
        assert!(matches!(transport.initial_context(), Context::Packet(_)));
        assert!(transport.lookup("/anything").is_none());
    }
}
