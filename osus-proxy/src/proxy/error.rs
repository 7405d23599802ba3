/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for the proxy layer.
//!
//! Request-time variants ([`ProxyError::MissingHost`],
//! [`ProxyError::UnknownHost`]) are turned into `500` responses by the
//! handler; their `Display` text is the response body.  Startup variants
//! (TLS files, bind) abort the program.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio_rustls::rustls;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request carried neither a `Host` header nor an absolute URI.
    #[error("host header not found")]
    MissingHost,

    /// The `Host` is not one of the proxied subdomains of the source domain.
    #[error("target domain for host {host} not found")]
    UnknownHost { host: String },

    #[error("failed to open {}: {source}", .path.display())]
    TlsFileOpen { path: PathBuf, source: io::Error },

    #[error("invalid PEM data in {}: {source}", .path.display())]
    InvalidPem { path: PathBuf, source: io::Error },

    #[error("no certificates found in {}", .path.display())]
    NoCertificates { path: PathBuf },

    #[error("no private key found in {}", .path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("TLS configuration rejected: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to build upstream HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
