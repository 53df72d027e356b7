// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS material for `STARTTLS` (spec.md §9: "TLS is a stream wrapper").
//! Client certificate verification (`CERTREQUEST`) is out of scope for this
//! core; only server-side cert/key loading is implemented (see DESIGN.md).

use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::error::StartupError;

pub struct TlsMaterial {
    pub acceptor: TlsAcceptor,
}

impl TlsMaterial {
    pub fn load(certfile: &Path, _certpath: Option<&Path>, disable_weak_ssl: bool) -> Result<Self, StartupError> {
        let pem = std::fs::read(certfile)
            .map_err(|e| StartupError::Tls(format!("failed to read {}: {e}", certfile.display())))?;

        let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
            .collect::<Result<_, _>>()
            .map_err(|e| StartupError::Tls(format!("failed to parse certificate chain: {e}")))?;
        if certs.is_empty() {
            return Err(StartupError::Tls(format!("no certificates found in {}", certfile.display())));
        }

        let key = rustls_pemfile::private_key(&mut pem.as_slice())
            .map_err(|e| StartupError::Tls(format!("failed to parse private key: {e}")))?
            .ok_or_else(|| StartupError::Tls(format!("no private key found in {}", certfile.display())))?;

        let provider = rustls::crypto::ring::default_provider();
        let versions: &[&rustls::SupportedProtocolVersion] =
            if disable_weak_ssl { &[&rustls::version::TLS13] } else { &[&rustls::version::TLS12, &rustls::version::TLS13] };

        let config = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(versions)
            .map_err(|e| StartupError::Tls(format!("unsupported protocol version set: {e}")))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| StartupError::Tls(format!("invalid certificate/key pair: {e}")))?;

        Ok(Self { acceptor: TlsAcceptor::from(Arc::new(config)) })
    }
}
