//! Timer wheel: a single priority queue of [`TimerEntry`] shared by every
//! Connection's TTL and any ad-hoc timeout (§4.2).
//!
//! Driven by the [`WorkerPool`](crate::worker::WorkerPool) idle loop rather
//! than its own thread: a worker with nothing else to do calls [`drive`]
//! and re-sleeps for at most one second.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A scheduled callback with restart semantics, per §3 `TimerEntry`.
///
/// `start_once` is a no-op while the entry is already live; `restart`
/// unconditionally updates the intended fire time. Cancellation is lazy:
/// a canceled entry is simply dropped the next time it would have popped.
pub struct TimerEntry {
    canceled: AtomicBool,
    generation: AtomicU64,
    callback: Mutex<Box<dyn FnMut() + Send>>,
}

impl TimerEntry {
    /// Creates a timer entry that is not yet scheduled.
    pub fn new(callback: impl FnMut() + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            canceled: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            callback: Mutex::new(Box::new(callback)),
        })
    }

    /// Whether this entry currently has a live, unfired schedule.
    pub fn is_live(&self) -> bool {
        !self.canceled.load(AtomicOrdering::Acquire)
    }
}

impl std::fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEntry")
            .field("live", &self.is_live())
            .finish()
    }
}

struct QueuedFire {
    due: Instant,
    seq: u64,
    generation: u64,
    entry: Arc<TimerEntry>,
}

// Ascending by due time; ties broken by insertion order (FIFO), matching
// §3's `TimerEntry` ordering rule. `BinaryHeap` is a max-heap, so the
// comparison is inverted to make the earliest-due, earliest-inserted entry
// compare greatest.
impl Ord for QueuedFire {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedFire {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedFire {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for QueuedFire {}

/// The process-wide timer wheel (§4.2).
#[derive(Debug)]
pub struct TimerWheel {
    queue: Mutex<BinaryHeap<QueuedFire>>,
    next_seq: AtomicU64,
}

impl TimerWheel {
    /// Creates an empty timer wheel.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Starts `entry` firing after `delay`, unless it already has a live
    /// schedule, in which case this call is a no-op.
    pub fn start_once(&self, entry: &Arc<TimerEntry>, delay: Duration) {
        if entry.is_live() {
            return;
        }
        entry.canceled.store(false, AtomicOrdering::Release);
        self.enqueue(entry, Instant::now() + delay);
    }

    /// Restarts `entry` to fire after `delay` from now, unconditionally
    /// replacing any previous schedule.
    pub fn restart(&self, entry: &Arc<TimerEntry>, delay: Duration) {
        entry.canceled.store(false, AtomicOrdering::Release);
        self.enqueue(entry, Instant::now() + delay);
    }

    /// Cancels `entry`. If it is already queued, the queued fire is
    /// dropped lazily when it would otherwise pop.
    pub fn cancel(&self, entry: &Arc<TimerEntry>) {
        entry.canceled.store(true, AtomicOrdering::Release);
    }

    fn enqueue(&self, entry: &Arc<TimerEntry>, due: Instant) {
        let generation = entry.generation.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.queue.lock().push(QueuedFire {
            due,
            seq,
            generation,
            entry: entry.clone(),
        });
    }

    /// The due time of the earliest live entry, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.lock().peek().map(|f| f.due)
    }

    /// Runs every entry due at or before `now`, discarding canceled or
    /// superseded ones along the way. Returns how many callbacks ran.
    ///
    /// Intended to be called from a worker with nothing else to do; the
    /// caller is responsible for bounding how often it polls (§4.2: at
    /// most once a second when the wheel is otherwise idle).
    pub fn drive(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut q = self.queue.lock();
                match q.peek() {
                    Some(f) if f.due <= now => q.pop(),
                    _ => None,
                }
            };

            let Some(fire) = next else { break };

            if fire.entry.canceled.load(AtomicOrdering::Acquire) {
                continue;
            }
            if fire.entry.generation.load(AtomicOrdering::Acquire) != fire.generation {
                // A later `restart` superseded this fire; it is stale.
                continue;
            }

            (fire.entry.callback.lock())();
            fired += 1;
        }
        fired
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn start_once_is_noop_while_live() {
        let wheel = TimerWheel::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let f = fires.clone();
        let entry = TimerEntry::new(move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });

        wheel.start_once(&entry, Duration::from_secs(0));
        wheel.start_once(&entry, Duration::from_secs(0));

        assert_eq!(wheel.drive(Instant::now()), 1);
        assert_eq!(fires.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn restart_supersedes_prior_schedule() {
        let wheel = TimerWheel::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let f = fires.clone();
        let entry = TimerEntry::new(move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });

        wheel.start_once(&entry, Duration::from_secs(0));
        wheel.restart(&entry, Duration::from_secs(0));

        // Only the most recent schedule should fire; the superseded one is
        // dropped lazily.
        assert_eq!(wheel.drive(Instant::now()), 1);
        assert_eq!(fires.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn cancel_before_due_prevents_fire() {
        let wheel = TimerWheel::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let f = fires.clone();
        let entry = TimerEntry::new(move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });

        wheel.start_once(&entry, Duration::from_secs(0));
        wheel.cancel(&entry);

        assert_eq!(wheel.drive(Instant::now()), 0);
        assert_eq!(fires.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn fairness_equal_due_times_fire_in_enqueue_order() {
        let wheel = TimerWheel::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let due = Instant::now();
        for i in 0..3 {
            let order = order.clone();
            let entry = TimerEntry::new(move || order.lock().push(i));
            wheel.enqueue(&entry, due);
        }

        wheel.drive(due);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
