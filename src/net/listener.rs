//! TCP listener setup.
//!
//! # Responsibilities
//! - Resolve the configured address (including the `:port` wildcard form)
//! - Bind before serving so bind failures surface as startup errors
//! - Hand a non-blocking socket to the serving layer

use std::net::{SocketAddr, TcpListener};

use thiserror::Error;

use crate::config::validation::resolve_bind_address;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Address did not parse or resolve.
    #[error("Invalid address {addr:?}: {source}")]
    Address {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A bound, non-blocking TCP socket ready for the serving layer.
#[derive(Debug)]
pub struct BoundListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl BoundListener {
    /// Bind to `addr`.
    pub fn bind(addr: &str) -> Result<Self, ListenerError> {
        let resolved = resolve_bind_address(addr).map_err(|source| ListenerError::Address {
            addr: addr.to_string(),
            source,
        })?;

        let bind_err = |source| ListenerError::Bind { addr: resolved, source };
        let inner = TcpListener::bind(resolved).map_err(bind_err)?;
        inner.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::debug!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Release the socket to the serving layer.
    pub fn into_std(self) -> TcpListener {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_ephemeral_port() {
        let listener = BoundListener::bind("127.0.0.1:0").unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn address_in_use_is_bind_error() {
        let first = BoundListener::bind("127.0.0.1:0").unwrap();
        let err = BoundListener::bind(&first.local_addr().to_string()).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[test]
    fn unresolvable_address() {
        let err = BoundListener::bind("not an address").unwrap_err();
        assert!(matches!(err, ListenerError::Address { .. }));
    }
}
