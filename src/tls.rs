//! TLS material for the HTTPS listener.
//!
//! Reads a PEM certificate chain and private key from disk and builds the
//! rustls server config handed to `axum-server`. The HTTPS listener only
//! starts when both paths are configured; bad material fails startup.

use anyhow::{anyhow, Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer},
    ServerConfig,
};
use rustls_pemfile::{certs, ec_private_keys, pkcs8_private_keys, rsa_private_keys};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TlsPaths {
    cert: PathBuf,
    key: PathBuf,
}

impl TlsPaths {
    #[must_use]
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn cert_path(&self) -> &Path {
        &self.cert
    }

    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key
    }
}

/// Build the rustls config for the HTTPS listener.
///
/// # Errors
/// Returns an error if the certificate or key cannot be read or parsed.
pub fn load_rustls_config(paths: &TlsPaths) -> Result<RustlsConfig> {
    let config = load_server_config(paths)?;
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

fn load_server_config(paths: &TlsPaths) -> Result<ServerConfig> {
    let cert_chain = load_cert_chain(paths.cert_path())?;
    let key = load_private_key(paths.key_path())?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .context("TLS certificate and key do not match")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        "TLS material loaded from {} and {}",
        paths.cert_path().display(),
        paths.key_path().display()
    );

    Ok(config)
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open TLS certificate: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read TLS certificate: {}", path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("TLS certificate is empty: {}", path.display()));
    }
    Ok(certs)
}

fn open_key(path: &Path) -> Result<BufReader<File>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open TLS key: {}", path.display()))?;
    Ok(BufReader::new(file))
}

// PKCS#8 first, then SEC1 and PKCS#1.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut keys = pkcs8_private_keys(&mut open_key(path)?)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read PKCS#8 TLS key: {}", path.display()))?;
    if let Some(key) = keys.pop() {
        return Ok(PrivateKeyDer::Pkcs8(key));
    }

    let mut keys = ec_private_keys(&mut open_key(path)?)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read SEC1 TLS key: {}", path.display()))?;
    if let Some(key) = keys.pop() {
        return Ok(PrivateKeyDer::Sec1(key));
    }

    let mut keys = rsa_private_keys(&mut open_key(path)?)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read PKCS#1 TLS key: {}", path.display()))?;
    if let Some(key) = keys.pop() {
        return Ok(PrivateKeyDer::Pkcs1(key));
    }

    Err(anyhow!("TLS private key not found: {}", path.display()))
}
