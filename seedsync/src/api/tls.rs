//! TLS serving with optional client-certificate identities.

use axum::middleware::AddExtension;
use axum::Extension;
use axum_server::accept::{Accept, DefaultAcceptor};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures_util::future::BoxFuture;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower::Layer;

use super::auth::PeerIdentity;
use crate::config::TlsConfig;
use crate::manifest::Fingerprint;
use crate::utils::{Result, SeedSyncError};

fn tls_error(context: &str, err: impl std::fmt::Display) -> SeedSyncError {
    SeedSyncError::Tls(format!("{context}: {err}"))
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path).map_err(|e| tls_error(&format!("cannot open {}", path.display()), e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| tls_error(&format!("invalid certificate in {}", path.display()), e))?;
    if certs.is_empty() {
        return Err(SeedSyncError::Tls(format!("no certificate found in {}", path.display())));
    }
    Ok(certs)
}

pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path).map_err(|e| tls_error(&format!("cannot open {}", path.display()), e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| tls_error(&format!("invalid private key in {}", path.display()), e))?
        .ok_or_else(|| SeedSyncError::Tls(format!("no private key found in {}", path.display())))
}

/// Build the server configuration. With a `client_ca`, callers must present
/// a certificate signed by it.
pub fn server_config(tls: &TlsConfig) -> Result<ServerConfig> {
    let (Some(cert), Some(key)) = (&tls.cert, &tls.key) else {
        return Err(SeedSyncError::Config("TLS requires both cert and key".to_string()));
    };
    let certs = load_certs(cert)?;
    let key = load_key(key)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error("unsupported protocol versions", e))?;

    let builder = match &tls.client_ca {
        Some(ca) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca)? {
                roots.add(cert).map_err(|e| tls_error("invalid client CA", e))?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| tls_error("cannot build client verifier", e))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder
        .with_single_cert(certs, key)
        .map_err(|e| tls_error("certificate and key do not match", e))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

/// Acceptor that completes the TLS handshake and attaches the peer's
/// certificate fingerprint to every request on the connection.
#[derive(Clone)]
pub struct PeerAcceptor {
    inner: RustlsAcceptor<DefaultAcceptor>,
}

impl PeerAcceptor {
    pub fn new(config: RustlsConfig) -> Self {
        Self {
            inner: RustlsAcceptor::new(config),
        }
    }
}

impl<I, S> Accept<I, S> for PeerAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, PeerIdentity>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();

        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;
            let (_, session) = stream.get_ref();
            let identity = PeerIdentity(
                session
                    .peer_certificates()
                    .and_then(|chain| chain.first())
                    .map(|leaf| Fingerprint::of_bytes(leaf.as_ref()).to_string()),
            );
            Ok((stream, Extension(identity).layer(service)))
        })
    }
}

/// Certificate fingerprint as used in `authorized_clients`.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let certs = load_certs(path)?;
    Ok(Fingerprint::of_bytes(certs[0].as_ref()).to_string())
}
