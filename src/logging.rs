//! Structured logging (§6): a `tracing` subscriber writing to a file sink
//! that `USR1` can swap out for a freshly opened file of the same path —
//! the log-rotation dance a long-running daemon needs without the crate
//! owning rotation policy itself. Grounded on
//! `original_source/src/log/{Log,LoggerManager,Sink}.{hpp,cpp}`; the pack
//! convention for this concern is `tracing` + `tracing-subscriber`, used
//! the same way across the example repos.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

static SINK: OnceLock<Arc<Mutex<File>>> = OnceLock::new();
static SINK_PATH: OnceLock<PathBuf> = OnceLock::new();

/// A clonable handle to the shared log file, satisfying
/// `tracing_subscriber`'s `Fn() -> W where W: io::Write` `MakeWriter`
/// blanket impl.
#[derive(Clone)]
struct SinkWriter(Arc<Mutex<File>>);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

fn open(path: &PathBuf) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initializes the global `tracing` subscriber, writing to `path` if
/// given or to stderr otherwise. Call once at startup.
pub fn init(path: Option<PathBuf>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match path {
        Some(path) => {
            let file = Arc::new(Mutex::new(open(&path)?));
            let _ = SINK.set(file.clone());
            let _ = SINK_PATH.set(path);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(move || SinkWriter(file.clone()))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

/// Reopens the log file at its configured path, picking up e.g. a
/// `logrotate` rename-and-recreate. A no-op when logging to stderr.
pub fn reload() {
    let (Some(sink), Some(path)) = (SINK.get(), SINK_PATH.get()) else {
        return;
    };
    match open(path) {
        Ok(file) => *sink.lock() = file,
        Err(err) => tracing::warn!(%err, path = %path.display(), "failed to reopen log file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_without_a_file_sink_is_a_no_op() {
        reload();
    }
}
