//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Detect half-configured TLS
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EchoConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{SocketAddr, ToSocketAddrs};

use thiserror::Error;

use crate::config::schema::{EchoConfig, TlsConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}: expected host:port")]
    BindAddress(String),

    #[error("TLS needs both a certificate and a key path")]
    IncompleteTls,

    #[error("subscribe interval must be greater than zero")]
    ZeroInterval,

    #[error("subscription concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("client target must not be empty")]
    EmptyTarget,

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EchoConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.server.listener;
    if !is_host_port(&listener.bind_address) {
        errors.push(ValidationError::BindAddress(listener.bind_address.clone()));
    }
    if let Some(tls) = &listener.tls {
        if TlsConfig::from_paths(&tls.cert_path, &tls.key_path).is_none() {
            errors.push(ValidationError::IncompleteTls);
        }
    }
    if config.server.subscribe_interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval);
    }

    if config.client.concurrency == 0 {
        errors.push(ValidationError::ZeroConcurrency);
    }
    if config.client.target.trim().is_empty() {
        errors.push(ValidationError::EmptyTarget);
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a numeric port; an empty host means every interface.
pub fn is_host_port(addr: &str) -> bool {
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Resolve a bind address, accepting the `:port` wildcard shorthand.
pub fn resolve_bind_address(addr: &str) -> std::io::Result<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    normalized.to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("address {:?} resolved to nothing", addr),
        )
    })
}
