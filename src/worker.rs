//! Workers process events occurring on connections, including TLS
//! handshakes, request parsing, routing, and writing of responses. They are
//! the driver behind the entire request pipeline, besides accepting or
//! closing the TCP connection (§4.3).
//!
//! Workers are designed to run alongside other workers, pulling due work
//! from a [`TaskQueue`] shared with the [`Reactor`](crate::reactor::Reactor)
//! and the [`TimerWheel`]. In essence, as many workers run as there are
//! threads to spare for them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::task::TaskQueue;
use crate::timer::TimerWheel;

const MAX_IDLE_SLEEP: Duration = Duration::from_secs(1);

/// The result of a handler-level operation that may need to wait on I/O
/// that this worker cannot block on (§4.3, §9 Design Notes).
///
/// The source suspends a stackful coroutine and restores its caller when
/// the awaited event arrives. This crate has no stack to swap: a handler
/// that cannot complete immediately builds its own continuation as an
/// ordinary closure, schedules it on the [`TaskQueue`] for when the awaited
/// condition will hold, and returns [`Outcome::Pending`]. Nothing about the
/// *caller's* stack needs preserving, because at most one task is ever
/// active for a given Connection (§4.4 capture discipline) — the
/// continuation closure already owns everything the resumed computation
/// needs.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation completed; here is its result.
    Ready(T),
    /// The operation could not complete synchronously. A continuation has
    /// already been scheduled and will resume the work.
    Pending,
}

impl<T> Outcome<T> {
    /// Returns the ready value, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            Outcome::Ready(t) => Some(t),
            Outcome::Pending => None,
        }
    }

    /// Whether the operation is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }
}

/// Fixed-size pool of worker threads draining a shared [`TaskQueue`] and
/// [`TimerWheel`] (§4.3).
#[derive(Debug)]
pub struct WorkerPool {
    tasks: Arc<TaskQueue>,
    timers: Arc<TimerWheel>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// The default pool size: `max(2, available_parallelism())`.
    pub fn default_size() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .max(2)
    }

    /// Spawns `workers` threads draining `tasks` and `timers`.
    pub fn new(workers: usize, tasks: Arc<TaskQueue>, timers: Arc<TimerWheel>) -> Self {
        let workers = workers.max(2);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker_tasks = tasks.clone();
            let worker_timers = timers.clone();
            let handle = thread::Builder::new()
                .name(format!("conduit-worker-{id}"))
                .spawn(move || worker_loop(id, &worker_tasks, &worker_timers))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        Self {
            tasks,
            timers,
            handles,
        }
    }

    /// A handle to the shared task queue, for submitting dispatch tasks or
    /// continuations from outside the pool (e.g. the Reactor's `dispatch`
    /// bootstrap, or the CLI's signal handlers).
    pub fn tasks(&self) -> Arc<TaskQueue> {
        self.tasks.clone()
    }

    /// A handle to the shared timer wheel.
    pub fn timers(&self) -> Arc<TimerWheel> {
        self.timers.clone()
    }

    /// Requests cooperative shutdown and blocks until every worker has
    /// drained the queue and exited. Idempotent (§8 property 9): a second
    /// call observes the queue already marked shut down and simply joins
    /// threads that have already exited.
    pub fn shutdown(mut self) {
        self.tasks.shutdown();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(id: usize, tasks: &TaskQueue, timers: &TimerWheel) {
    loop {
        if let Some(task) = tasks.try_pop(Instant::now()) {
            run_task(id, task);
            continue;
        }

        if timers.drive(Instant::now()) > 0 {
            continue;
        }

        if tasks.is_shutting_down() && tasks.is_empty() {
            return;
        }

        match tasks.wait_for_due(MAX_IDLE_SLEEP) {
            Some(task) => run_task(id, task),
            None => {
                if tasks.is_shutting_down() && tasks.is_empty() {
                    return;
                }
            }
        }
    }
}

#[inline]
fn run_task(id: usize, task: crate::task::Task) {
    // The worker loop must never let a handler panic take the whole
    // process down with it (§7 propagation policy).
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(worker = id, %message, "worker task panicked; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn pool_runs_scheduled_tasks_and_shuts_down_idempotently() {
        let tasks = Arc::new(TaskQueue::new());
        let timers = Arc::new(TimerWheel::new());
        let pool = WorkerPool::new(2, tasks.clone(), timers);

        let counter = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(2));
        let c = counter.clone();
        let b = barrier.clone();
        tasks.schedule_now(move || {
            c.fetch_add(1, Ordering::SeqCst);
            b.wait();
        });
        barrier.wait();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        pool.shutdown();
    }

    #[test]
    fn a_panicking_task_does_not_kill_the_pool() {
        let tasks = Arc::new(TaskQueue::new());
        let timers = Arc::new(TimerWheel::new());
        let pool = WorkerPool::new(2, tasks.clone(), timers);

        tasks.schedule_now(|| panic!("boom"));

        let counter = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(2));
        let c = counter.clone();
        let b = barrier.clone();
        tasks.schedule_now(move || {
            c.fetch_add(1, Ordering::SeqCst);
            b.wait();
        });
        barrier.wait();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        pool.shutdown();
    }
}
