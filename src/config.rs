//! Typed configuration (§6), loaded from a TOML file named by `--config`.
//! Grounded on `original_source/src/configs/Config.{hpp,cpp}` and
//! `Options.{hpp,cpp}` for the key names and nesting, loaded via
//! `serde` + `toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, EngineError};

/// Top-level configuration, mirroring §6's `core` / `transports[]` keys.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub core: CoreConfig,
    #[serde(default)]
    pub transports: Vec<TransportConfig>,
}

/// `core.*` keys: process-wide knobs that are not specific to any one
/// transport.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// Number of worker threads; `0` picks one per available core
    /// (`WorkerPool::default_size`'s own fallback).
    #[serde(default)]
    pub workers: usize,
    /// The process title to report (e.g. via `setproctitle`-style
    /// mechanisms); purely cosmetic.
    #[serde(default = "default_process_name")]
    pub process_name: String,
    /// The IANA time zone name used for log timestamps.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_process_name() -> String {
    "conduitd".to_string()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// One `transports[]` entry: a listening address plus the services bound
/// to it.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransportKindConfig,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    /// PEM certificate chain path, required when `secure` is set.
    #[serde(default)]
    pub cert_path: Option<String>,
    /// PEM private key path, required when `secure` is set.
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl TransportConfig {
    /// The resolved listening address, combining `host`/`port`.
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "transports[].host",
                reason: format!("could not resolve '{}:{}' for transport '{}'", self.host, self.port, self.name),
            })
    }
}

/// Which framing a transport speaks, per §4.10's `TransportKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKindConfig {
    Http,
    Packet,
}

/// One `transports[].services[]` entry: a handler bound under a path.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub path: String,
}

impl Config {
    /// Reads and parses a TOML config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let text = r#"
            [core]
            workers = 4

            [[transports]]
            name = "api"
            type = "http"
            host = "0.0.0.0"
            port = 8080

            [[transports.services]]
            type = "echo"
            path = "/echo"
        "#;

        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.core.workers, 4);
        assert_eq!(config.core.process_name, "conduitd");
        assert_eq!(config.transports.len(), 1);
        assert_eq!(config.transports[0].kind, TransportKindConfig::Http);
        assert_eq!(config.transports[0].services[0].path, "/echo");
    }

    #[test]
    fn missing_core_table_fails_to_parse() {
        let err = toml::from_str::<Config>("").unwrap_err();
        assert!(err.to_string().contains("core"));
    }

    #[test]
    fn rejects_bad_host_port_pair() {
        let transport = TransportConfig {
            name: "bad".to_string(),
            kind: TransportKindConfig::Http,
            host: "not a host".to_string(),
            port: 0,
            secure: false,
            cert_path: None,
            key_path: None,
            services: Vec::new(),
        };
        assert!(transport.addr().is_err());
    }
}
