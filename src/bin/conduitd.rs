//! The `conduitd` CLI entry point (§6): loads a TOML config from
//! `--config`, starts the engine, installs signal handlers, and blocks
//! until shutdown is requested. Grounded on
//! `original_source/src/configs/Options.{hpp,cpp}` for the single
//! `--config` flag; crate stack is `clap` derive, matching the pack's
//! convention for a service binary's argument parsing.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use conduit::config::Config;
use conduit::runtime::{Runtime, ServiceFactory};
use conduit::service::Service;

#[derive(Parser, Debug)]
#[command(name = "conduitd", about = "A general-purpose network service host")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: PathBuf,
}

/// The engine ships no built-in application services; a real deployment
/// links its own `ServiceFactory` and its own `main`. This one answers
/// every configured service with "not implemented" so the binary is
/// still runnable (and useful for smoke-testing transports/TLS/signals)
/// on its own.
struct NullServiceFactory;

impl ServiceFactory for NullServiceFactory {
    fn build(&self, service_type: &str) -> Option<Arc<dyn Service>> {
        tracing::warn!(service_type, "no built-in service for type; register a ServiceFactory of your own");
        None
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    conduit::logging::init(None)?;

    let config = Config::load(&args.config)?;
    let runtime = Runtime::start(&config, &NullServiceFactory)?;

    conduit::signals::install(runtime.reactor())?;
    tracing::info!(config = %args.config.display(), "conduitd started");

    runtime.wait_for_shutdown();
    tracing::info!("shutting down");
    runtime.shutdown();

    Ok(())
}
