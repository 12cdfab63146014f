//! Long-poll/streaming aggregator (§4.11): batches outgoing events behind
//! a short timer so a burst of `out()` calls coalesces into one flush
//! instead of one write per event, with HTTP long-poll and WebSocket
//! streaming using different aggregation windows. Grounded on
//! `original_source/src/transport/Lps.cpp` for the batching/ack scheme;
//! the timer plumbing is built on [`TimerEntry`]/[`TimerWheel`] (§4.2),
//! the same mechanism `Connection`'s own TTL renewal uses.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::{Compressor, Serializer, Value};
use crate::timer::{TimerEntry, TimerWheel};

/// How a bound Connection receives a flushed batch. Implemented by
/// whatever owns the Connection's outbound buffer; kept separate from
/// `Connection` itself so the aggregator has no dependency on the
/// Reactor or a particular protocol framer.
pub trait Sink: Send + Sync {
    /// Delivers one flushed, already-encoded batch. `close` requests the
    /// connection be closed once the batch is sent.
    fn deliver(&self, batch: Vec<u8>, close: bool);
}

/// The aggregation window for a bound connection (§4.11: "500 ms over
/// HTTP long-poll, 50 ms over an established WebSocket").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationWindow {
    /// An HTTP long-poll connection.
    HttpLongPoll,
    /// An established WebSocket connection.
    WebSocket,
}

impl AggregationWindow {
    fn duration(self) -> Duration {
        match self {
            AggregationWindow::HttpLongPoll => Duration::from_millis(500),
            AggregationWindow::WebSocket => Duration::from_millis(50),
        }
    }
}

struct State {
    queued: Vec<(u64, Value)>,
    unacked: BTreeMap<u64, Value>,
    close_after_flush: bool,
}

/// One Connection's batching state (§3 `LpsContext` in spirit, though the
/// source's class carries the same name). Events queued via
/// [`out`](Self::out) are flushed together the next time the aggregation
/// timer fires, or immediately if [`send`](Self::send) is called first.
pub struct LongPollAggregator {
    state: Mutex<State>,
    next_id: AtomicU64,
    window: AggregationWindow,
    codec: Arc<dyn Serializer>,
    compressor: Option<Arc<dyn Compressor>>,
    sink: Arc<dyn Sink>,
    timers: Arc<TimerWheel>,
    flush_timer: Arc<TimerEntry>,
}

impl LongPollAggregator {
    /// Creates an aggregator bound to `sink`, flushing on `window`'s
    /// schedule. `compressor` is `Some` to prefix every batch with a
    /// one-byte gzip indicator and compress it when doing so shrinks the
    /// payload (§4.11).
    pub fn new(
        window: AggregationWindow,
        codec: Arc<dyn Serializer>,
        compressor: Option<Arc<dyn Compressor>>,
        sink: Arc<dyn Sink>,
        timers: Arc<TimerWheel>,
    ) -> Arc<Self> {
        let aggregator = Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let flush_timer = TimerEntry::new(move || {
                if let Some(aggregator) = weak.upgrade() {
                    aggregator.send();
                }
            });
            Self {
                state: Mutex::new(State {
                    queued: Vec::new(),
                    unacked: BTreeMap::new(),
                    close_after_flush: false,
                }),
                next_id: AtomicU64::new(1),
                window,
                codec,
                compressor,
                sink,
                timers,
                flush_timer,
            }
        });
        aggregator
    }

    /// Queues `value` for the next flush, arming the aggregation timer if
    /// it is not already running. If `close` is set, the connection is
    /// closed once this (or a later, coalesced) flush is sent.
    pub fn out(&self, value: Value, close: bool) {
        {
            let mut state = self.state.lock();
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            state.queued.push((id, value));
            if close {
                state.close_after_flush = true;
            }
        }
        self.timers.start_once(&self.flush_timer, self.window.duration());
    }

    /// Flushes whatever is queued immediately, bypassing the timer.
    /// Idempotent: flushing with nothing queued is a no-op unless a close
    /// was requested.
    pub fn send(&self) {
        let (batch, close) = {
            let mut state = self.state.lock();
            if state.queued.is_empty() && !state.close_after_flush {
                return;
            }
            let batch: Vec<(u64, Value)> = std::mem::take(&mut state.queued);
            for (id, value) in &batch {
                state.unacked.insert(*id, value.clone());
            }
            (batch, state.close_after_flush)
        };

        let envelope = Value::Array(
            batch
                .into_iter()
                .map(|(id, value)| serde_json::json!({"id": id, "value": value}))
                .collect(),
        );

        let encoded = match self.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%err, "failed to encode LPS batch");
                return;
            }
        };

        let payload = match &self.compressor {
            Some(compressor) => match compressor.deflate(&encoded) {
                Ok(compressed) if compressed.len() < encoded.len() => {
                    let mut out = Vec::with_capacity(compressed.len() + 1);
                    out.push(1);
                    out.extend_from_slice(&compressed);
                    out
                }
                _ => {
                    let mut out = Vec::with_capacity(encoded.len() + 1);
                    out.push(0);
                    out.extend_from_slice(&encoded);
                    out
                }
            },
            None => encoded,
        };

        self.sink.deliver(payload, close);
    }

    /// Marks every event up to and including `id` as acknowledged by the
    /// peer, releasing them from the redelivery map (§4.11 ack scheme).
    pub fn ack(&self, id: u64) {
        let mut state = self.state.lock();
        state.unacked.retain(|&queued_id, _| queued_id > id);
    }

    /// Events sent but not yet acknowledged, oldest first — what a
    /// reconnecting long-poll client should be handed again.
    pub fn unacked(&self) -> Vec<Value> {
        self.state.lock().unacked.values().cloned().collect()
    }
}
