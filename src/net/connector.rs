//! Active socket establishment (§4.5 `TcpConnector`).
//!
//! Resolves the host via [`HostnameResolver`], then issues a non-blocking
//! `connect()` against each candidate address in turn. `mio`'s connect is
//! always non-blocking, so unlike the original C++ (which polls for
//! `EADDRNOTAVAIL` and retries), failures here only surface once the
//! Reactor observes the socket's writable-with-error event; callers keep
//! [`PendingConnect::remaining`] around to advance to the next address
//! when that happens.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use mio::Token;
use rustls::{ClientConfig, ClientConnection};

use crate::connection::Connection;
use crate::registry::Transport;
use crate::resolver::HostnameResolver;

/// A connection attempt in flight, plus the addresses left to try if the
/// current one fails (§4.5: "on error or HUP it advances to the next
/// address; exhaustion fails the connector").
pub struct PendingConnect {
    /// The Connection wrapping the in-flight socket.
    pub connection: Connection,
    /// Host name, for TLS SNI on the next attempt.
    pub host: String,
    /// Port to use for any remaining address.
    pub port: u16,
    /// Addresses not yet attempted.
    pub remaining: Vec<SocketAddr>,
    tls: Option<Arc<ClientConfig>>,
}

impl std::fmt::Debug for PendingConnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnect")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("remaining", &self.remaining.len())
            .finish()
    }
}

impl PendingConnect {
    /// Advances to the next candidate address, replacing `connection`.
    /// Returns `None` once every address has been exhausted.
    pub fn advance(mut self, token: Token, transport: Weak<Transport>) -> io::Result<Option<Self>> {
        let Some(addr) = self.remaining.pop() else {
            return Ok(None);
        };
        self.connection = dial(token, addr, &self.host, self.tls.clone(), transport)?;
        Ok(Some(self))
    }
}

/// Resolves `host` and begins connecting to the first candidate address,
/// keeping the rest in reserve (§4.5, §4.6).
pub fn connect(
    resolver: &HostnameResolver,
    token: Token,
    host: &str,
    port: u16,
    tls: Option<Arc<ClientConfig>>,
    transport: Weak<Transport>,
) -> io::Result<PendingConnect> {
    let mut addrs = resolver.resolve(host, port)?;
    if addrs.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"));
    }
    // `remaining` is consumed from the back via `pop`, so reverse once up
    // front to try addresses in resolver order.
    addrs.reverse();
    let first = addrs.pop().expect("checked non-empty above");

    Ok(PendingConnect {
        connection: dial(token, first, host, tls.clone(), transport)?,
        host: host.to_string(),
        port,
        remaining: addrs,
        tls,
    })
}

fn dial(
    token: Token,
    addr: SocketAddr,
    host: &str,
    tls: Option<Arc<ClientConfig>>,
    transport: Weak<Transport>,
) -> io::Result<Connection> {
    let stream = mio::net::TcpStream::connect(addr)?;

    match tls {
        None => Ok(Connection::new_tcp_client(token, stream, transport)),
        Some(config) => {
            let name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let session = ClientConnection::new(config, name)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Ok(Connection::new_tls_client(token, stream, session, transport))
        }
    }
}
