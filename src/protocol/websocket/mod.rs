//! RFC 6455 WebSocket handshake and framing (§4.8).
//!
//! Grounded on
//! `original_source/src/transport/websocket/{WsFrame,WsContext,WsServer}.cpp`
//! for the exact wire layout and handshake sequence.

pub mod frame;

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::ParseError;
use crate::protocol::http::{HttpRequest, HttpResponse, StatusCode};

pub use frame::{Frame, Opcode};

const MAGIC_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The Flash cross-domain policy sentinel some older clients probe for
/// before a real handshake (§4.8).
pub const POLICY_FILE_REQUEST: &[u8] = b"<policy-file-request/>\0";

/// The static policy document served in response.
pub const POLICY_FILE_RESPONSE: &[u8] =
    b"<?xml version=\"1.0\"?><cross-domain-policy><allow-access-from domain=\"*\" to-ports=\"*\"/></cross-domain-policy>\0";

/// Handshake progress for one Connection.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HandshakeState {
    /// Server side: waiting for the client's upgrade request.
    AwaitingRequest,
    /// Client side: request sent, waiting for the server's 101 response.
    AwaitingResponse,
    /// The handshake completed; frames may now be parsed/emitted.
    Established,
}

/// Per-Connection WebSocket state (§3 WsContext).
#[derive(Debug)]
pub struct WsContext {
    /// Current handshake phase.
    pub state: HandshakeState,
    /// Client-side nonce awaiting the server's echoed accept key.
    client_nonce: Option<String>,
    /// A data frame whose payload has not been fully received yet.
    partial: Option<frame::PartialFrame>,
}

impl WsContext {
    /// A context ready to receive a server-side handshake request.
    pub fn new_server() -> Self {
        Self {
            state: HandshakeState::AwaitingRequest,
            client_nonce: None,
            partial: None,
        }
    }

    /// A context that has just sent a client-side handshake request with
    /// the given base64 nonce.
    pub fn new_client(nonce: String) -> Self {
        Self {
            state: HandshakeState::AwaitingResponse,
            client_nonce: Some(nonce),
            partial: None,
        }
    }

    /// The `Sec-WebSocket-Accept` value the server must echo for `key`
    /// (§8 Testable Property 5).
    pub fn accept_key(key: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(key.as_bytes());
        hasher.update(MAGIC_GUID.as_bytes());
        let digest = hasher.finalize();
        base64::engine::general_purpose::STANDARD.encode(digest)
    }

    /// Validates a server-side upgrade request and returns the 101
    /// response to send, or an error response to send instead (§4.8).
    pub fn handshake_server(request: &HttpRequest) -> Result<(WsContext, HttpResponse), HttpResponse> {
        let upgrade_ok = request
            .header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let connection_ok = request
            .header("connection")
            .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);
        let key = request.header("sec-websocket-key").filter(|k| !k.is_empty());

        let (Some(key), true, true) = (key, upgrade_ok, connection_ok) else {
            return Err(HttpResponse::new(StatusCode::BAD_REQUEST)
                .header("Connection", "Close")
                .body(b"Bad WebSocket handshake".to_vec()));
        };

        let accept = Self::accept_key(key);
        let mut response = HttpResponse::new(StatusCode::SWITCHING_PROTOCOLS)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", accept);

        if let Some(protocol) = request.header("sec-websocket-protocol") {
            let first = protocol.split(',').next().unwrap_or("").trim().to_string();
            if !first.is_empty() {
                response = response.header("Sec-WebSocket-Protocol", first);
            }
        }

        Ok((
            WsContext {
                state: HandshakeState::Established,
                client_nonce: None,
                partial: None,
            },
            response,
        ))
    }

    /// Generates a fresh 16-byte nonce for a client-side handshake request.
    pub fn generate_client_nonce() -> String {
        let mut bytes = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    /// Validates the server's response to a client-side handshake.
    pub fn complete_client_handshake(&mut self, response_headers: &[(String, String)]) -> Result<(), ParseError> {
        let nonce = self.client_nonce.as_deref().ok_or(ParseError::BadHandshake)?;
        let expected = Self::accept_key(nonce);
        let got = response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("sec-websocket-accept"))
            .map(|(_, v)| v.as_str());
        if got != Some(expected.as_str()) {
            return Err(ParseError::BadHandshake);
        }
        self.state = HandshakeState::Established;
        Ok(())
    }

    /// Parses as many complete frames as are buffered, returning them in
    /// arrival order along with any reply frames the protocol itself
    /// generates (Pong replies, Close echoes) — §4.8 opcode handling.
    pub fn feed(
        &mut self,
        inbound: &mut crate::buffer::Buffer,
    ) -> Result<(Vec<Frame>, Vec<Frame>), ParseError> {
        let mut delivered = Vec::new();
        let mut replies = Vec::new();

        loop {
            match frame::parse_frame(inbound, &mut self.partial)? {
                None => break,
                Some(frame) => match frame.opcode {
                    Opcode::Ping => {
                        replies.push(Frame::unmasked(Opcode::Pong, frame.payload.clone()));
                        delivered.push(frame);
                    }
                    Opcode::Close => {
                        replies.push(Frame::unmasked(Opcode::Close, close_payload(1000, "Bye!")));
                        delivered.push(frame);
                        break;
                    }
                    Opcode::Text | Opcode::Binary | Opcode::Pong => delivered.push(frame),
                },
            }
        }

        Ok((delivered, replies))
    }
}

fn close_payload(code: u16, reason: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    payload
}

/// Builds a Close frame carrying `code`/`reason`, for closes the engine
/// itself initiates rather than echoes (§4.8, §4.10).
pub(crate) fn close_frame(code: u16, reason: &str) -> Frame {
    Frame::unmasked(Opcode::Close, close_payload(code, reason))
}

/// The Close frame to send for a `feed` failure, per §4.8's close-code
/// mapping: continuation/unknown opcodes get 1003, an over-large frame
/// gets 1009, anything else gets the generic protocol-error code 1002.
pub(crate) fn close_frame_for_error(err: &ParseError) -> Frame {
    let code = match err {
        ParseError::UnsupportedOpcode => 1003,
        ParseError::FrameTooLarge => 1009,
        _ => 1002,
    };
    close_frame(code, "")
}
