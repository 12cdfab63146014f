//! Crate-wide error types.
//!
//! Per-connection protocol failures (malformed HTTP, bad WebSocket frames)
//! stay as the small typed enums living next to their parsers; this module
//! only covers engine-level failures that cross component boundaries:
//! configuration, startup, and connection-level I/O/TLS errors.

use std::io;

use thiserror::Error;

/// Errors raised while loading or validating configuration (§6).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("could not read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The config file's contents could not be parsed as TOML.
    #[error("could not parse config file {path}: {source}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: toml::de::Error,
    },

    /// A key required by the core was absent.
    #[error("missing required configuration key: {0}")]
    MissingKey(&'static str),

    /// A key was present but held a value outside its valid range.
    #[error("invalid value for configuration key {key}: {reason}")]
    InvalidValue {
        /// The offending key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors raised while framing a protocol message: malformed HTTP, a bad
/// WebSocket frame, or an oversized packet (§4.7-§4.9, §7). These never
/// abort the process; the caller maps them to a 4xx/close-code response
/// and a short linger TTL.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The request line was malformed, or the method was neither GET nor
    /// POST.
    #[error("malformed request line")]
    BadRequestLine,

    /// The header block exceeded the 4 KiB cap before a terminating blank
    /// line was found.
    #[error("headers data too large")]
    HeadersTooLarge,

    /// A header line was missing its `:` separator.
    #[error("malformed header")]
    BadHeader,

    /// A chunk-size line could not be parsed as hex, or a chunk exceeded
    /// the 4 MiB cap.
    #[error("malformed chunked transfer-encoding")]
    BadChunk,

    /// The WebSocket handshake request was missing a required header or
    /// upgrade token.
    #[error("malformed websocket handshake")]
    BadHandshake,

    /// A WebSocket frame's header was malformed or exceeded size limits.
    #[error("malformed websocket frame")]
    BadFrame,

    /// A WebSocket continuation opcode was received; continuations are
    /// not supported (close code 1003).
    #[error("unsupported websocket opcode")]
    UnsupportedOpcode,

    /// A WebSocket frame declared a payload larger than the inbound
    /// buffer's grow limit (close code 1009).
    #[error("websocket frame too large")]
    FrameTooLarge,

    /// No registered handler matched the request path.
    #[error("no handler for path")]
    NoRoute,
}

/// Errors arising from a single connection's I/O or TLS layer (§7).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A plain socket operation failed for a reason other than
    /// would-block/interrupted.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),

    /// The TLS handshake or record layer failed fatally.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The peer's 12-byte connection preface did not match HTTP/2, and the
    /// fallback HTTP/1.1 parse also failed.
    #[error("could not determine protocol for connection")]
    UnknownProtocol,
}

/// Top-level engine errors: the ones that abort startup or are fatal to the
/// whole process rather than to one connection.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Binding a listening socket failed.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// TLS server configuration (certificate/key material) was invalid.
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(String),

    /// A signal handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] io::Error),
}
