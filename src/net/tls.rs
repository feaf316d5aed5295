//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load the server certificate chain and key before the socket is bound
//! - Build client configurations from a CA bundle or with verification off
//! - Pin one process-wide crypto provider

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;

use crate::config::TlsConfig;

/// ALPN identifier for HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";

/// Errors raised while preparing TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Certificate file not found: {0}")]
    CertNotFound(String),

    #[error("Private key file not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid certificate or key: {0}")]
    Invalid(#[source] std::io::Error),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No usable CA certificate in {0}")]
    NoCertificates(String),

    #[error("TLS setup failed: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Install the default crypto provider unless one is already installed.
///
/// Several crates in the tree may enable different rustls backends; pinning
/// one here keeps `ServerConfig::builder()` and `ClientConfig::builder()`
/// unambiguous.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Load the server TLS configuration from certificate and key files.
pub async fn load_server_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    if !cert_path.exists() {
        return Err(TlsError::CertNotFound(config.cert_path.clone()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(config.key_path.clone()));
    }

    install_crypto_provider();

    // Advertises h2 and http/1.1 over ALPN.
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(TlsError::Invalid)
}

/// Build a client configuration.
///
/// With `ca_cert_path` the server must chain to one of its certificates;
/// `insecure_skip_verify` disables chain and host name checks entirely.
pub fn client_config(
    ca_cert_path: Option<&str>,
    insecure_skip_verify: bool,
) -> Result<ClientConfig, TlsError> {
    install_crypto_provider();

    let mut config = if insecure_skip_verify {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new()))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        if let Some(path) = ca_cert_path {
            for cert in load_certificates(path)? {
                roots.add(cert)?;
            }
        }
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(config)
}

fn load_certificates(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_string(),
        source,
    })?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
        .filter_map(Result::ok)
        .collect();
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

/// Accepts any server certificate.
///
/// Signatures are still checked with the provider's algorithms so the
/// handshake itself stays sound.
#[derive(Debug)]
struct SkipServerVerification {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl SkipServerVerification {
    fn new() -> Self {
        Self {
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        }
    }
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_files_fail_fast() {
        let config = TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        };
        let err = load_server_config(&config).await.unwrap_err();
        assert!(matches!(err, TlsError::CertNotFound(_)));
    }

    #[tokio::test]
    async fn garbage_pem_is_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a certificate").unwrap();
        writeln!(key, "not a key").unwrap();

        let config = TlsConfig {
            cert_path: cert.path().display().to_string(),
            key_path: key.path().display().to_string(),
        };
        let err = load_server_config(&config).await.unwrap_err();
        assert!(matches!(err, TlsError::Invalid(_)));
    }

    #[test]
    fn ca_bundle_without_certificates() {
        let mut ca = tempfile::NamedTempFile::new().unwrap();
        writeln!(ca, "nothing here").unwrap();
        let path = ca.path().display().to_string();

        let err = client_config(Some(&path), false).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[test]
    fn insecure_client_negotiates_h2() {
        let config = client_config(None, true).unwrap();
        assert_eq!(config.alpn_protocols, vec![ALPN_H2.to_vec()]);
    }
}
