//! The task queue: a priority queue of deferred closures keyed by due time,
//! ties broken by insertion order (§3 Task, §4.3).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// A unit of deferred work: a callable plus the time it becomes due.
///
/// The source's "parent-stack handle" (the continuation to restore when a
/// suspended task completes) has no separate representation here: a
/// suspending handler builds its own continuation as an ordinary `Task` and
/// pushes it back onto the queue before returning, so the continuation
/// closure itself plays the role the parent handle would have (§4.3).
pub struct Task {
    due: Instant,
    seq: u64,
    work: Box<dyn FnOnce() + Send>,
}

impl Task {
    fn new(due: Instant, seq: u64, work: Box<dyn FnOnce() + Send>) -> Self {
        Self { due, seq, work }
    }

    /// Runs this task's work, consuming it.
    pub fn run(self) {
        (self.work)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("due", &self.due)
            .field("seq", &self.seq)
            .finish()
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Task {}

/// A priority queue of [`Task`]s shared by all workers in a
/// [`WorkerPool`](crate::worker::WorkerPool).
#[derive(Debug)]
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<Task>>,
    condvar: Condvar,
    next_seq: AtomicU64,
    shutdown: std::sync::atomic::AtomicBool,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            condvar: Condvar::new(),
            next_seq: AtomicU64::new(0),
            shutdown: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Schedules `work` to run at `due`. Tasks scheduled at the same due
    /// time run in the order they were scheduled.
    pub fn schedule_at(&self, due: Instant, work: impl FnOnce() + Send + 'static) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(Task::new(due, seq, Box::new(work)));
        self.condvar.notify_one();
    }

    /// Schedules `work` to run as soon as possible.
    pub fn schedule_now(&self, work: impl FnOnce() + Send + 'static) {
        self.schedule_at(Instant::now(), work);
    }

    /// Pops the next due task without blocking, or `None` if the earliest
    /// task (if any) is not yet due.
    pub fn try_pop(&self, now: Instant) -> Option<Task> {
        let mut heap = self.heap.lock();
        match heap.peek() {
            Some(t) if t.due <= now => heap.pop(),
            _ => None,
        }
    }

    /// The due time of the earliest queued task, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.lock().peek().map(|t| t.due)
    }

    /// Blocks the calling worker until a task is due or `bound` elapses,
    /// whichever comes first, then returns it if one is now due.
    pub fn wait_for_due(&self, bound: std::time::Duration) -> Option<Task> {
        let now = Instant::now();
        if let Some(task) = self.try_pop(now) {
            return Some(task);
        }
        if self.shutdown.load(AtomicOrdering::Acquire) {
            return None;
        }

        let wait = self
            .next_due()
            .map(|due| due.saturating_duration_since(now).min(bound))
            .unwrap_or(bound);

        let mut heap = self.heap.lock();
        self.condvar.wait_for(&mut heap, wait);
        let now = Instant::now();
        match heap.peek() {
            Some(t) if t.due <= now => heap.pop(),
            _ => None,
        }
    }

    /// Marks the queue as shutting down and wakes every waiting worker so
    /// they can observe it and drain remaining tasks (§4.3, §5).
    pub fn shutdown(&self) {
        self.shutdown.store(true, AtomicOrdering::Release);
        self.condvar.notify_all();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(AtomicOrdering::Acquire)
    }

    /// Number of tasks currently queued (for tests and diagnostics).
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Whether the queue currently holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
