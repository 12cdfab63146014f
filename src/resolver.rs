//! Process-wide hostname cache (§4.6), grounded on
//! `original_source/src/net/HostnameResolver.{hpp,cpp}`: entries keyed by
//! lowercased hostname, each living 3600 s.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const ENTRY_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
}

/// A cache of resolved hostnames shared by every `TcpConnector` (§4.6).
///
/// Cache misses call the OS resolver synchronously on the calling
/// worker thread. That is legal per §5: the calling task may itself be a
/// suspended-and-resumed handler task rather than the reactor's dispatch
/// task, so other workers are not blocked by the lookup.
#[derive(Debug, Default)]
pub struct HostnameResolver {
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl HostnameResolver {
    /// An empty resolver cache.
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `host:port`, consulting and populating the cache.
    pub fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        let key = host.to_ascii_lowercase();
        let now = Instant::now();

        if let Some(entry) = self.cache.lock().get(&key) {
            if entry.expires_at > now {
                return Ok(entry.addrs.clone());
            }
        }

        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        self.cache.lock().insert(
            key,
            CacheEntry {
                addrs: addrs.clone(),
                expires_at: now + ENTRY_TTL,
            },
        );
        Ok(addrs)
    }

    /// Number of cached hostnames, for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the cache currently holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
