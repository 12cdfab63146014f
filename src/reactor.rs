//! The single-epoll connection manager (§4.4), generalized from a
//! dedicated listener thread (`Listener::run`'s own accept/poll/dispatch
//! loop, handing captured work to a shared pool) into a self-re-enqueuing
//! [`TaskQueue`] task so the same worker threads that run handlers also
//! drive `epoll_wait`.
//!
//! Connections live in one `Slab` guarded by a `parking_lot::ReentrantMutex`
//! — the "big mutex" of §5 — which is never held across the blocking
//! `epoll_wait` call; a separate mutex serializes access to the `mio::Poll`
//! instance itself.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Poll, Token};
use parking_lot::{Mutex, ReentrantMutex};
use rustls::ServerConnection;
use slab::Slab;

use crate::connection::{events, Connection};
use crate::registry::Transport;
use crate::resolver::HostnameResolver;
use crate::task::TaskQueue;
use crate::timer::TimerWheel;

/// How long a dispatch task blocks in `epoll_wait` before giving every
/// worker a chance to observe shutdown and to rebalance ready work (§4.4:
/// no dedicated waker thread; the bounded timeout plays that role).
const POLL_TIMEOUT: Duration = Duration::from_millis(50);
const EVENTS_CAPACITY: usize = 1024;

struct ReactorState {
    all: Slab<Arc<Mutex<Connection>>>,
    ready: VecDeque<Token>,
}

/// The Reactor: one shared `Poll`, one connection table, and the
/// self-perpetuating `dispatch` task that keeps pulling I/O work onto the
/// worker pool (§4.4).
pub struct Reactor {
    state: ReentrantMutex<RefCell<ReactorState>>,
    poll: Mutex<Poll>,
    tasks: Arc<TaskQueue>,
    timers: Arc<TimerWheel>,
    resolver: Arc<HostnameResolver>,
    shutdown: AtomicBool,
}

impl Reactor {
    /// Creates an empty Reactor sharing `tasks`/`timers`/`resolver` with
    /// the rest of the engine.
    pub fn new(tasks: Arc<TaskQueue>, timers: Arc<TimerWheel>, resolver: Arc<HostnameResolver>) -> io::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            state: ReentrantMutex::new(RefCell::new(ReactorState {
                all: Slab::new(),
                ready: VecDeque::new(),
            })),
            poll: Mutex::new(Poll::new()?),
            tasks,
            timers,
            resolver,
            shutdown: AtomicBool::new(false),
        }))
    }

    /// Binds and registers `transport`'s listening socket, returning the
    /// token its Acceptor Connection was assigned.
    pub fn listen(self: &Arc<Self>, transport: Arc<Transport>) -> io::Result<Token> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let entry = state.all.vacant_entry();
        let token = Token(entry.key());

        let mut conn = crate::net::acceptor::bind(token, transport.addr, Arc::downgrade(&transport))?;
        conn.register(self.poll.lock().registry())?;
        entry.insert(Arc::new(Mutex::new(conn)));
        Ok(token)
    }

    /// Requests the dispatch loop stop rescheduling itself once every
    /// connection has drained. Existing in-flight work still runs to
    /// completion.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Starts the self-perpetuating dispatch task on the shared queue.
    /// Call once after `listen`-ing every configured transport.
    pub fn start(self: &Arc<Self>) {
        self.requeue_self();
    }

    fn requeue_self(self: &Arc<Self>) {
        let me = Arc::clone(self);
        self.tasks.schedule_now(move || me.dispatch());
    }

    fn dispatch(self: &Arc<Self>) {
        if self.shutdown.load(Ordering::Acquire) {
            let guard = self.state.lock();
            if guard.borrow().all.is_empty() {
                return;
            }
        }

        let popped = {
            let guard = self.state.lock();
            guard.borrow_mut().ready.pop_front()
        };

        if let Some(token) = popped {
            self.process_token(token);
            self.requeue_self();
            return;
        }

        if let Err(err) = self.poll_and_merge() {
            tracing::warn!(?err, "epoll_wait failed");
        }
        self.requeue_self();
    }

    /// Blocks in `epoll_wait` (bounded by `POLL_TIMEOUT`) without holding
    /// the big mutex, then folds observed events into each Connection's
    /// pending/postponed bits and the ready queue (§4.4, §5).
    fn poll_and_merge(self: &Arc<Self>) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        {
            let mut poll = self.poll.lock();
            poll.poll(&mut events, Some(POLL_TIMEOUT))?;
        }

        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        for event in events.iter() {
            let token = event.token();
            let Some(conn) = state.all.get(token.0).cloned() else {
                continue;
            };

            let is_acceptor = {
                let mut c = conn.lock();
                c.merge_event(event_bits(event));
                c.variant == crate::connection::Variant::Acceptor
            };

            if is_acceptor {
                self.accept_new(&mut state, token, &conn)?;
                continue;
            }

            let captured = conn.lock().captured;
            if !captured {
                state.ready.push_back(token);
            }
        }

        Ok(())
    }

    fn accept_new(self: &Arc<Self>, state: &mut ReactorState, _acceptor_token: Token, acceptor: &Arc<Mutex<Connection>>) -> io::Result<()> {
        let Some(transport) = acceptor.lock().transport.upgrade() else {
            return Ok(());
        };

        let accepted = acceptor.lock().accept_all()?;
        for (stream, _peer) in accepted {
            let entry = state.all.vacant_entry();
            let token = Token(entry.key());
            let weak = Arc::downgrade(&transport);

            let mut conn = if transport.secure {
                let Some(tls_config) = transport.tls_server_config.clone() else {
                    tracing::error!(transport = %transport.name, "secure transport missing TLS config");
                    continue;
                };
                let session = match ServerConnection::new(tls_config) {
                    Ok(s) => s,
                    Err(err) => {
                        tracing::warn!(%err, "TLS session setup failed for accepted connection");
                        continue;
                    }
                };
                Connection::new_tls_server(token, stream, session, weak)?
            } else {
                Connection::new_tcp_server(token, stream, weak)?
            };
            conn.context = transport.initial_context();
            conn.bound_service = transport.bind_initial_service();

            conn.register(self.poll.lock().registry())?;
            entry.insert(Arc::new(Mutex::new(conn)));
        }
        Ok(())
    }

    fn process_token(self: &Arc<Self>, token: Token) {
        let conn = {
            let guard = self.state.lock();
            guard.borrow().all.get(token.0).cloned()
        };
        let Some(conn) = conn else { return };

        conn.lock().captured = true;

        let me = Arc::clone(self);
        self.tasks.schedule_now(move || me.run_connection(token, conn));
    }

    fn run_connection(self: &Arc<Self>, token: Token, conn: Arc<Mutex<Connection>>) {
        let mut c = conn.lock();

        let read_progress = match c.pump_io() {
            Ok(progress) => progress,
            Err(err) => {
                tracing::debug!(?err, "connection I/O error");
                c.error = true;
                false
            }
        };

        if read_progress {
            if let Some(transport) = c.transport.upgrade() {
                transport.drive(&mut c, &self.resolver, &self.timers);
            }
        }

        let fully_drained = c.outbound.is_empty();
        let should_close = c.error || c.closed || c.timed_out || (c.eof && c.no_read && fully_drained);

        if should_close {
            c.closed = true;
            let _ = c.deregister(self.poll.lock().registry());
            drop(c);
            let guard = self.state.lock();
            guard.borrow_mut().all.try_remove(token.0);
            return;
        }

        c.release();
        let requeue = c.has_pending();
        if let Err(err) = c.reregister(self.poll.lock().registry()) {
            tracing::warn!(?err, "failed to reregister connection");
        }
        drop(c);

        if requeue {
            let guard = self.state.lock();
            guard.borrow_mut().ready.push_back(token);
        }
    }
}

fn event_bits(event: &mio::event::Event) -> u8 {
    let mut bits = 0;
    if event.is_readable() {
        bits |= events::READABLE;
    }
    if event.is_writable() {
        bits |= events::WRITABLE;
    }
    if event.is_error() {
        bits |= events::ERROR;
    }
    if event.is_read_closed() || event.is_write_closed() {
        bits |= events::HUP;
    }
    bits
}
