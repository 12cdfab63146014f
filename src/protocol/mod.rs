//! Protocol framers: HTTP/1.1, WebSocket, length-prefixed packets, and a
//! minimal custom-status protocol, plus the `Context` that a Connection
//! holds while it drives one of them (§3 Context, §4.7-§4.9).

pub mod http;
pub mod packet;
pub mod status;
pub mod websocket;

use crate::error::ParseError;

/// The protocol-specific state a Connection carries, replaced wholesale on
/// upgrade (HTTP → WebSocket).
#[derive(Debug)]
pub enum Context {
    /// HTTP/1.1 request/response framing.
    Http(http::HttpContext),
    /// An established or handshaking WebSocket session.
    Ws(websocket::WsContext),
    /// 16-bit length-prefixed packets.
    Packet(packet::PacketContext),
    /// A bare custom-status session with no request/response framing.
    Status(status::StatusContext),
}

impl Context {
    /// A fresh HTTP context, the default for any newly-accepted plain or
    /// TLS server-side connection.
    pub fn new_http() -> Self {
        Context::Http(http::HttpContext::new())
    }

    /// A fresh packet context.
    pub fn new_packet() -> Self {
        Context::Packet(packet::PacketContext::new())
    }

    /// A fresh status context.
    pub fn new_status() -> Self {
        Context::Status(status::StatusContext::new())
    }
}

/// What happened as a result of feeding more bytes to a protocol context.
#[derive(Debug)]
pub enum Progress {
    /// Not enough data yet; wait for more bytes.
    NeedMore,
    /// A request/message was fully parsed and (if applicable) a response
    /// was written to the outbound buffer. The caller should continue
    /// feeding any bytes left over.
    Produced,
    /// The protocol requested the Connection replace its Context (HTTP
    /// upgrading to WebSocket).
    Upgrade(Context),
    /// The protocol requested the Connection close after the outbound
    /// buffer drains (bad request, WebSocket close frame echoed, etc).
    CloseAfterFlush,
}

pub(crate) type FeedResult = Result<Progress, ParseError>;
