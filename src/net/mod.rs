//! Passive and active socket establishment: the Acceptor and Connector
//! process loops named in §4.5, built directly on `mio::net` rather than
//! through a generic socket trait — an earlier `TcpStream`/`TcpListener`
//! trait pair existed only to swap in a test double, a need this
//! crate's connection-level tests (§8 S1-S6) cover a different way.

pub mod acceptor;
pub mod connector;
