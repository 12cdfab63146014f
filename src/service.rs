//! The handler seam (§4.10): what a transport routes a request to once
//! [`Transport::lookup`](crate::registry::Transport::lookup) has picked a
//! route. Grounded on `multilistener.rs`'s `event()`, which left an
//! explicit `// handle routing for request handlers here` TODO at exactly
//! this point in the dispatch path.

use std::net::SocketAddr;

use crate::protocol::http::request::HttpRequest;
use crate::protocol::http::response::HttpResponse;
use crate::protocol::websocket::frame::Frame;
use crate::resolver::HostnameResolver;
use crate::timer::TimerWheel;

/// Everything a handler needs beyond the request itself: who is asking,
/// and handles back into shared engine state for anything that needs a
/// timer or a hostname lookup of its own.
pub struct ServiceContext<'a> {
    /// The remote peer, if known (absent for e.g. unix-domain sockets).
    pub peer: Option<SocketAddr>,
    /// Shared hostname cache, for handlers that themselves act as clients.
    pub resolver: &'a HostnameResolver,
    /// Shared timer wheel, for handlers that need their own deadlines.
    pub timers: &'a TimerWheel,
}

/// A routable unit of application behavior. One `Transport` may register
/// many services under different path prefixes (§4.10); a service only
/// needs to implement the protocol surfaces it actually cares about.
///
/// Default methods answer "not implemented" so a service bound only to
/// HTTP, say, need not stub out WebSocket and packet handling.
pub trait Service: Send + Sync {
    /// Handles one complete HTTP request, returning the response to send.
    fn handle_http(&self, _ctx: &ServiceContext, _request: &HttpRequest) -> HttpResponse {
        HttpResponse::not_found()
    }

    /// Handles one WebSocket message, returning any frames to send back.
    /// Ping/Pong/Close are already handled by the framer before this is
    /// reached (§4.8); only Text/Binary frames arrive here.
    fn handle_ws(&self, _ctx: &ServiceContext, _frame: &Frame) -> Vec<Frame> {
        Vec::new()
    }

    /// Handles one length-prefixed packet, returning a reply payload if
    /// any.
    fn handle_packet(&self, _ctx: &ServiceContext, _payload: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl Service for Echo {
        fn handle_packet(&self, _ctx: &ServiceContext, payload: &[u8]) -> Option<Vec<u8>> {
            Some(payload.to_vec())
        }
    }

    #[test]
    fn default_http_handler_is_not_found() {
        struct Mute;
        impl Service for Mute {}

        let resolver = HostnameResolver::new();
        let timers = TimerWheel::new();
        let ctx = ServiceContext {
            peer: None,
            resolver: &resolver,
            timers: &timers,
        };
        let request = HttpRequest {
            method: crate::protocol::http::request::Method::Get,
            target: "/anything".to_string(),
            version: crate::protocol::http::request::Version::Http11,
            headers: Vec::new(),
            body: Vec::new(),
        };
        let response = Mute.handle_http(&ctx, &request);
        assert_eq!(response.status.0, 404);
    }

    #[test]
    fn packet_echo_round_trips() {
        let resolver = HostnameResolver::new();
        let timers = TimerWheel::new();
        let ctx = ServiceContext {
            peer: None,
            resolver: &resolver,
            timers: &timers,
        };
        assert_eq!(Echo.handle_packet(&ctx, b"hi"), Some(b"hi".to_vec()));
    }
}
