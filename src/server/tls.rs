//! TLS listener setup.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Certificate and key for a TLS listener, as PEM files on disk.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

pub(crate) fn build_acceptor(options: &TlsOptions) -> crate::Result<TlsAcceptor> {
    let file = File::open(&options.certificate)
        .with_context(|| format!("opening certificate {}", options.certificate.display()))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .context("reading certificate chain")?;

    let file = File::open(&options.private_key)
        .with_context(|| format!("opening private key {}", options.private_key.display()))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(file))
        .context("reading private key")?
        .context("no private key found")?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building tls server config")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
