/*
 * net.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Strada, a blocking-style HTTP/1.1 client library.
 *
 * Strada is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Strada is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Strada.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Shared TLS context: trust store and optional server identity, built once
//! and handed to any number of sessions.
//!
//! Cloning a `TlsContext` bumps a reference count; the configuration behind it
//! is immutable once built, so sessions on different threads may share it.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tracing::{debug, warn};

use crate::error::TlsConfigError;

/// Build a root certificate store: platform native certs first, then webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = root_store.add_parsable_certificates(certs);
            debug!(added, ignored, "loaded native root certificates");
        }
        Err(e) => warn!(error = %e, "cannot load native root certificates"),
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

static DEFAULT_CLIENT: OnceLock<TlsContext> = OnceLock::new();

struct Inner {
    client: Option<Arc<ClientConfig>>,
    server: Option<Arc<ServerConfig>>,
}

/// Reference-counted TLS configuration shared by sessions.
#[derive(Clone)]
pub struct TlsContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("client", &self.inner.client.is_some())
            .field("server", &self.inner.server.is_some())
            .field("shares", &self.share_count())
            .finish()
    }
}

impl TlsContext {
    /// Process-wide client context verifying against the platform (or Mozilla) roots.
    pub fn client_default() -> TlsContext {
        DEFAULT_CLIENT
            .get_or_init(|| {
                let config = ClientConfig::builder()
                    .with_root_certificates(build_root_store())
                    .with_no_client_auth();
                TlsContext {
                    inner: Arc::new(Inner {
                        client: Some(Arc::new(config)),
                        server: None,
                    }),
                }
            })
            .clone()
    }

    pub fn builder() -> TlsContextBuilder {
        TlsContextBuilder::default()
    }

    pub fn client_config(&self) -> Option<Arc<ClientConfig>> {
        self.inner.client.clone()
    }

    pub fn server_config(&self) -> Option<Arc<ServerConfig>> {
        self.inner.server.clone()
    }

    /// Number of live handles sharing this context.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

/// Assembles a `TlsContext`. Without any verify source the OS/Mozilla roots are used.
#[derive(Debug, Default)]
pub struct TlsContextBuilder {
    roots: Option<RootCertStore>,
    cert_chain: Vec<CertificateDer<'static>>,
    key: Option<PrivateKeyDer<'static>>,
    alpn: Vec<Vec<u8>>,
}

impl TlsContextBuilder {
    fn roots_mut(&mut self) -> &mut RootCertStore {
        self.roots.get_or_insert_with(RootCertStore::empty)
    }

    /// Trust every certificate in a PEM file.
    pub fn load_verify_file(mut self, path: impl AsRef<Path>) -> Result<Self, TlsConfigError> {
        let path = path.as_ref();
        let certs = read_certs(path)?;
        if certs.is_empty() {
            return Err(TlsConfigError::NoCertificate(path.display().to_string()));
        }
        for cert in certs {
            self.roots_mut()
                .add(cert)
                .map_err(|e| TlsConfigError::Certificate(e.to_string()))?;
        }
        Ok(self)
    }

    /// Trust every parsable certificate found in PEM files in a directory.
    pub fn load_verify_dir(mut self, dir: impl AsRef<Path>) -> Result<Self, TlsConfigError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| TlsConfigError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let mut added = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match read_certs(&path) {
                Ok(certs) => {
                    let (ok, _) = self.roots_mut().add_parsable_certificates(certs);
                    added += ok;
                }
                Err(e) => debug!(path = %path.display(), error = %e, "skipping"),
            }
        }
        if added == 0 {
            return Err(TlsConfigError::NoCertificate(dir.display().to_string()));
        }
        Ok(self)
    }

    /// Add the platform/Mozilla roots to whatever is already trusted.
    pub fn load_os_verify(mut self) -> Self {
        let os = build_root_store();
        self.roots_mut().roots.extend(os.roots);
        self
    }

    /// Trust certificates given as PEM text.
    pub fn add_root_pem(mut self, pem: &[u8]) -> Result<Self, TlsConfigError> {
        let certs = rustls_pemfile::certs(&mut &pem[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsConfigError::Certificate(e.to_string()))?;
        if certs.is_empty() {
            return Err(TlsConfigError::NoCertificate("PEM input".into()));
        }
        for cert in certs {
            self.roots_mut()
                .add(cert)
                .map_err(|e| TlsConfigError::Certificate(e.to_string()))?;
        }
        Ok(self)
    }

    /// Server certificate chain, PEM, leaf first.
    pub fn use_certificate_file(mut self, path: impl AsRef<Path>) -> Result<Self, TlsConfigError> {
        let path = path.as_ref();
        let certs = read_certs(path)?;
        if certs.is_empty() {
            return Err(TlsConfigError::NoCertificate(path.display().to_string()));
        }
        self.cert_chain = certs;
        Ok(self)
    }

    /// Server private key, PEM (PKCS#1, PKCS#8 or SEC1).
    pub fn use_private_key_file(mut self, path: impl AsRef<Path>) -> Result<Self, TlsConfigError> {
        let path = path.as_ref();
        let mut reader = open(path)?;
        let key = rustls_pemfile::private_key(&mut reader).map_err(|source| {
            TlsConfigError::Io {
                path: path.display().to_string(),
                source,
            }
        })?;
        match key {
            Some(key) => {
                self.key = Some(key);
                Ok(self)
            }
            None => Err(TlsConfigError::NoPrivateKey(path.display().to_string())),
        }
    }

    /// In-memory server identity, for callers that do not keep PEM files.
    pub fn use_identity(
        mut self,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Self {
        self.cert_chain = chain;
        self.key = Some(key);
        self
    }

    pub fn alpn_protocols(mut self, protocols: &[&[u8]]) -> Self {
        self.alpn = protocols.iter().map(|p| p.to_vec()).collect();
        self
    }

    /// Freeze the configuration. A server config is built only when both a
    /// certificate chain and a key were supplied.
    pub fn build(self) -> Result<TlsContext, TlsConfigError> {
        let roots = match self.roots {
            Some(roots) => roots,
            None => build_root_store(),
        };
        let mut client = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        client.alpn_protocols = self.alpn.clone();

        let server = match self.key {
            Some(key) if !self.cert_chain.is_empty() => {
                let mut server = ServerConfig::builder()
                    .with_no_client_auth()
                    .with_single_cert(self.cert_chain, key)?;
                server.alpn_protocols = self.alpn;
                Some(Arc::new(server))
            }
            _ => None,
        };
        Ok(TlsContext {
            inner: Arc::new(Inner {
                client: Some(Arc::new(client)),
                server,
            }),
        })
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let mut reader = open(path)?;
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_config() {
        let ctx = TlsContext::builder().build().unwrap();
        assert_eq!(ctx.share_count(), 1);
        let other = ctx.clone();
        assert_eq!(ctx.share_count(), 2);
        assert!(Arc::ptr_eq(
            &ctx.client_config().unwrap(),
            &other.client_config().unwrap()
        ));
        drop(other);
        assert_eq!(ctx.share_count(), 1);
        assert!(ctx.server_config().is_none());
    }

    #[test]
    fn default_client_context_is_cached() {
        let a = TlsContext::client_default();
        let b = TlsContext::client_default();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn empty_pem_is_rejected() {
        let err = TlsContext::builder().add_root_pem(b"").unwrap_err();
        assert!(matches!(err, TlsConfigError::NoCertificate(_)));
    }

    #[test]
    fn missing_verify_file_reports_path() {
        let err = TlsContext::builder()
            .load_verify_file("/nonexistent/strada-ca.pem")
            .unwrap_err();
        match err {
            TlsConfigError::Io { path, .. } => assert!(path.ends_with("strada-ca.pem")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
