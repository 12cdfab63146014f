//! The top-level engine (§9 Design Notes: "process-wide state → explicit
//! context"): owns the `WorkerPool`, `Reactor`, `TimerWheel`, `TaskQueue`,
//! and `HostnameResolver` a running process needs, and wires them up from
//! a parsed [`Config`]. Generalizes a fixed `main.rs` wiring of one
//! `Listener` and one `WorkerPool` side by side into many configured
//! transports instead of one fixed HTTP responder.

use std::sync::Arc;

use crate::config::{Config, TransportKindConfig};
use crate::error::EngineError;
use crate::reactor::Reactor;
use crate::registry::{Transport, TransportKind};
use crate::resolver::HostnameResolver;
use crate::service::Service;
use crate::task::TaskQueue;
use crate::timer::TimerWheel;
use crate::worker::WorkerPool;

/// Registers a configured service by its `type` string. Application
/// binaries implement this to map config-file service names onto actual
/// `Service` instances; the engine itself has no built-in services.
pub trait ServiceFactory: Send + Sync {
    /// Builds the service named by `service_type`, if recognized.
    fn build(&self, service_type: &str) -> Option<Arc<dyn Service>>;
}

/// The running engine: a worker pool and a reactor sharing one task
/// queue, timer wheel, and hostname resolver.
pub struct Runtime {
    reactor: Arc<Reactor>,
    workers: Option<WorkerPool>,
}

impl Runtime {
    /// Builds every transport named in `config`, binding and registering
    /// its services via `factory`, then starts the worker pool and
    /// reactor dispatch loop. Returns the running `Runtime`; call
    /// [`shutdown`](Self::shutdown) to stop it.
    pub fn start(config: &Config, factory: &dyn ServiceFactory) -> Result<Self, EngineError> {
        let workers = if config.core.workers == 0 {
            WorkerPool::default_size()
        } else {
            config.core.workers
        };

        let tasks = Arc::new(TaskQueue::new());
        let timers = Arc::new(TimerWheel::new());
        let resolver = Arc::new(HostnameResolver::new());

        let pool = WorkerPool::new(workers, tasks.clone(), timers.clone());
        let reactor = Reactor::new(tasks, timers, resolver).map_err(|source| EngineError::Bind {
            addr: "epoll".to_string(),
            source,
        })?;

        for transport_config in &config.transports {
            let transport = build_transport(transport_config, factory)?;
            let addr = transport.addr;
            reactor.listen(Arc::new(transport)).map_err(|source| EngineError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        }

        reactor.start();

        Ok(Self {
            reactor,
            workers: Some(pool),
        })
    }

    /// A handle to the reactor, for installing signal handlers.
    pub fn reactor(&self) -> Arc<Reactor> {
        self.reactor.clone()
    }

    /// Blocks the calling thread until a signal handler (or any other
    /// caller) requests shutdown via the reactor.
    pub fn wait_for_shutdown(&self) {
        while !self.reactor.is_shutting_down() {
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
    }

    /// Requests shutdown and blocks until every worker has drained the
    /// task queue and exited (§8 property 9).
    pub fn shutdown(mut self) {
        self.reactor.shutdown();
        if let Some(pool) = self.workers.take() {
            pool.shutdown();
        }
    }
}

fn build_transport(
    config: &crate::config::TransportConfig,
    factory: &dyn ServiceFactory,
) -> Result<Transport, EngineError> {
    let addr = config.addr().map_err(EngineError::from)?;
    let kind = match config.kind {
        TransportKindConfig::Http => TransportKind::Http,
        TransportKindConfig::Packet => TransportKind::Packet,
    };

    let mut transport = Transport::new(config.name.clone(), addr, config.secure, kind);

    if config.secure {
        let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) else {
            return Err(EngineError::TlsConfig(format!(
                "transport '{}' is secure but cert_path/key_path are not both set",
                config.name
            )));
        };
        let tls_config = crate::tls::load_server_config(cert_path, key_path)?;
        transport = transport.with_tls(tls_config);
    }

    for service_config in &config.services {
        let Some(service) = factory.build(&service_config.kind) else {
            tracing::warn!(service_type = %service_config.kind, transport = %config.name, "no service registered for type");
            continue;
        };
        match kind {
            TransportKind::Http => transport.register_http(service_config.path.clone(), service),
            TransportKind::Packet => transport.register_packet(service),
        }
    }

    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServiceConfig, TransportConfig};

    struct NoServices;
    impl ServiceFactory for NoServices {
        fn build(&self, _service_type: &str) -> Option<Arc<dyn Service>> {
            None
        }
    }

    #[test]
    fn secure_transport_without_cert_paths_is_rejected() {
        let config = TransportConfig {
            name: "api".to_string(),
            kind: TransportKindConfig::Http,
            host: "127.0.0.1".to_string(),
            port: 8443,
            secure: true,
            cert_path: None,
            key_path: None,
            services: Vec::new(),
        };

        let err = build_transport(&config, &NoServices).unwrap_err();
        assert!(matches!(err, EngineError::TlsConfig(_)));
    }

    #[test]
    fn plain_transport_needs_no_tls_material() {
        let config = TransportConfig {
            name: "api".to_string(),
            kind: TransportKindConfig::Http,
            host: "127.0.0.1".to_string(),
            port: 8080,
            secure: false,
            cert_path: None,
            key_path: None,
            services: vec![ServiceConfig {
                kind: "echo".to_string(),
                path: "/echo".to_string(),
            }],
        };

        let transport = build_transport(&config, &NoServices).unwrap();
        assert!(transport.tls_server_config.is_none());
    }
}
