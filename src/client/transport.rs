//! Client channel construction.
//!
//! # Responsibilities
//! - Parse the target into an authority and TLS server name
//! - Dial clear-text h2c, or TLS with a custom rustls configuration
//! - Build request metadata from `key=value` entries

use std::sync::Arc;

use axum::http::uri::{Authority, Uri};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::{Channel, Endpoint};

use crate::client::ClientError;
use crate::config::{parse_metadata, ClientConfig};
use crate::net::tls;

/// Parsed dial target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    authority: Authority,
}

impl Target {
    /// Accepts `host:port` with an optional `http://` or `https://` prefix.
    pub fn parse(target: &str) -> Result<Self, ClientError> {
        let trimmed = target
            .trim()
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');

        let authority: Authority = trimmed
            .parse()
            .map_err(|_| ClientError::InvalidTarget(target.to_string()))?;
        if authority.host().is_empty() {
            return Err(ClientError::InvalidTarget(target.to_string()));
        }
        Ok(Self { authority })
    }

    /// Host without IPv6 brackets.
    pub fn host(&self) -> &str {
        self.authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
    }

    pub fn authority(&self) -> &str {
        self.authority.as_str()
    }
}

/// Whether the client configuration asks for TLS.
pub fn wants_tls(config: &ClientConfig) -> bool {
    config.ca_cert_path.as_deref().is_some_and(|p| !p.is_empty()) || config.insecure_skip_verify
}

/// Open a channel to the configured target.
pub async fn connect_channel(config: &ClientConfig) -> Result<Channel, ClientError> {
    let target = Target::parse(&config.target)?;

    // The scheme stays http: TLS, when wanted, is layered by our connector.
    let endpoint = Endpoint::from_shared(format!("http://{}", target.authority()))?
        .connect_timeout(config.connect_timeout())
        .tcp_nodelay(true);

    if !wants_tls(config) {
        return Ok(endpoint.connect().await?);
    }

    let ca_cert_path = config.ca_cert_path.as_deref().filter(|p| !p.is_empty());
    let tls_config = tls::client_config(ca_cert_path, config.insecure_skip_verify)?;
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(target.host().to_string())
        .map_err(|_| ClientError::InvalidTarget(config.target.clone()))?;

    let channel = endpoint
        .connect_with_connector(tower::service_fn(move |uri: Uri| {
            let connector = connector.clone();
            let server_name = server_name.clone();
            async move {
                let authority = uri
                    .authority()
                    .map(|a| a.as_str().to_string())
                    .ok_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::InvalidInput, "target without authority")
                    })?;
                let tcp = TcpStream::connect(authority).await?;
                tcp.set_nodelay(true)?;
                let stream = connector.connect(server_name, tcp).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await?;

    Ok(channel)
}

/// Build outgoing metadata from `key=value` entries.
pub fn build_metadata(entries: &[String]) -> Result<MetadataMap, ClientError> {
    let mut metadata = MetadataMap::new();
    for (key, value) in parse_metadata(entries) {
        let name = MetadataKey::from_bytes(key.to_ascii_lowercase().as_bytes())
            .map_err(|_| ClientError::InvalidMetadata(key.clone()))?;
        let value = MetadataValue::try_from(value.as_str())
            .map_err(|_| ClientError::InvalidMetadata(key.clone()))?;
        metadata.append(name, value);
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_forms() {
        let target = Target::parse("localhost:8080").unwrap();
        assert_eq!(target.host(), "localhost");
        assert_eq!(target.authority(), "localhost:8080");

        let target = Target::parse("http://127.0.0.1:9000/").unwrap();
        assert_eq!(target.authority(), "127.0.0.1:9000");

        let target = Target::parse("[::1]:8080").unwrap();
        assert_eq!(target.host(), "::1");

        assert!(Target::parse("").is_err());
        assert!(Target::parse("bad target").is_err());
    }

    #[test]
    fn tls_selection() {
        let mut config = ClientConfig::default();
        assert!(!wants_tls(&config));

        config.ca_cert_path = Some(String::new());
        assert!(!wants_tls(&config));

        config.insecure_skip_verify = true;
        assert!(wants_tls(&config));
    }

    #[test]
    fn metadata_keeps_repeated_keys() {
        let metadata = build_metadata(&[
            "X-Env=staging".to_string(),
            "x-env=prod".to_string(),
        ])
        .unwrap();

        let values: Vec<_> = metadata
            .get_all("x-env")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["staging", "prod"]);
    }

    #[test]
    fn metadata_rejects_binary_keys() {
        let err = build_metadata(&["trace-bin=abc".to_string()]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidMetadata(_)));
    }
}
