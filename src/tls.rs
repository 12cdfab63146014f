//! Loads server certificate/key material from PEM files into a
//! `rustls::ServerConfig` (§6: "an external SslHelper supplies server
//! certificate/key and client CA bundle" — this is that helper, the one
//! concrete way this crate offers to supply it, alongside
//! `Transport::with_tls` for callers that build their own `ServerConfig`).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;

use crate::error::EngineError;

/// Builds a `ServerConfig` with no client-auth from a PEM certificate
/// chain and a PEM private key, the common case for a server-side TLS
/// transport.
pub fn load_server_config(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Arc<ServerConfig>, EngineError> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();

    let certs = read_certs(cert_path)?;
    let key = read_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| EngineError::TlsConfig(format!("{cert_path:?}/{key_path:?}: {err}")))?;

    Ok(Arc::new(config))
}

fn read_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, EngineError> {
    let file = File::open(path).map_err(|err| EngineError::TlsConfig(format!("{path:?}: {err}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| EngineError::TlsConfig(format!("{path:?}: {err}")))
}

fn read_private_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>, EngineError> {
    let file = File::open(path).map_err(|err| EngineError::TlsConfig(format!("{path:?}: {err}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| EngineError::TlsConfig(format!("{path:?}: {err}")))?
        .ok_or_else(|| EngineError::TlsConfig(format!("{path:?}: no private key found")))
}
