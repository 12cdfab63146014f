//! A bare "custom status" context: no request/response framing of its
//! own, used by transports that just want the Connection/Reactor
//! machinery without HTTP, WebSocket, or packet semantics layered on top
//! (§1 lists "custom status" alongside HTTP/WebSocket/packet).

/// Per-Connection state for the custom-status protocol: nothing beyond
/// the buffers, which the owning handler reads and writes directly.
#[derive(Debug, Default)]
pub struct StatusContext;

impl StatusContext {
    /// A fresh status context.
    pub fn new() -> Self {
        Self
    }
}
