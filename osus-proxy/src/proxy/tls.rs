/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! TLS termination for the local listener.
//!
//! The osu! client only talks HTTPS to its `-devserver`, so the proxy needs a
//! certificate for `*.<source domain>` that the local machine trusts.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use super::error::ProxyError;

fn open(path: &Path) -> Result<BufReader<File>, ProxyError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ProxyError::TlsFileOpen {
            path: path.to_path_buf(),
            source,
        })
}

/// Read every `CERTIFICATE` block from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProxyError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ProxyError::InvalidPem {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(ProxyError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Read the first PKCS#1, PKCS#8 or SEC1 private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ProxyError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ProxyError::InvalidPem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| ProxyError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}

/// Build an HTTP/1.1-only acceptor from a certificate chain and key on disk.
pub fn build_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ProxyError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "Loaded TLS certificate"
    );
    Ok(TlsAcceptor::from(Arc::new(config)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
