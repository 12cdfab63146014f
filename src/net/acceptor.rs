//! Passive socket establishment (§4.5 `TcpAcceptor`).
//!
//! Binding produces a [`Connection`](crate::connection::Connection) with
//! [`Variant::Acceptor`](crate::connection::Variant::Acceptor); the Reactor
//! then drives it exactly like any other Connection, calling
//! [`Connection::accept_all`] whenever it is readable. This folds what
//! used to be a separate `Listener`/`MultiListener` accept loop into the
//! same capture/dispatch path every other socket goes through, rather
//! than a parallel `LISTEN_TOKEN` special case.

use std::io;
use std::net::SocketAddr;
use std::sync::Weak;

use mio::Token;

use crate::connection::Connection;
use crate::registry::Transport;

/// Binds a non-blocking listening socket at `addr` and wraps it as an
/// Acceptor Connection under `token`, owned by `transport`.
pub fn bind(token: Token, addr: SocketAddr, transport: Weak<Transport>) -> io::Result<Connection> {
    let listener = mio::net::TcpListener::bind(addr)?;
    Ok(Connection::new_acceptor(token, listener, transport))
}
