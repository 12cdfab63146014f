//! `conduit`: a general-purpose, epoll-driven network service engine.
//!
//! A single [`reactor::Reactor`] multiplexes every socket through one
//! `mio::Poll`; a shared [`worker::WorkerPool`] drains protocol work from
//! a [`task::TaskQueue`] so at most one task is ever active per
//! [`connection::Connection`] at a time. [`registry::Transport`] binds
//! configured [`service::Service`] handlers to HTTP paths or a whole
//! length-prefixed-packet listener, and [`runtime::Runtime`] wires the
//! pieces together from a parsed [`config::Config`].

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod lps;
pub mod net;
pub mod protocol;
pub mod reactor;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod service;
pub mod signals;
pub mod task;
pub mod timer;
pub mod tls;
pub mod worker;
