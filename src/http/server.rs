//! Echo server setup and lifecycle.
//!
//! # Responsibilities
//! - Resolve the server identity once
//! - Load TLS material and bind the socket, failing fast on either
//! - Serve HTTP/1.1, h2c and TLS on one listener via the protocol router
//! - Close idempotently and make the blocking `listen` return `Closed`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use axum_server::Handle;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::make::Shared;

use crate::config::ServerConfig;
use crate::http::plain::plain_router;
use crate::http::router::ProtocolRouter;
use crate::net::{tls, BoundListener, ListenerError, TlsError};
use crate::observability::Throttle;
use crate::rpc::{EchoService, RpcHandler, Subscribers};

/// Errors returned by [`EchoServer::listen`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// Certificate or key could not be loaded.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsError),

    /// Address invalid or bind failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// The OS host name could not be read.
    #[error("Failed to resolve hostname: {0}")]
    Hostname(#[source] std::io::Error),

    /// Subscriptions need a positive push interval.
    #[error("subscribe interval must be positive")]
    ZeroInterval,

    /// The serving loop failed.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    /// `close` was called; this is a clean shutdown.
    #[error("server closed")]
    Closed,
}

impl ServerError {
    /// Whether this error only signals a requested shutdown.
    pub fn is_closed(&self) -> bool {
        matches!(self, ServerError::Closed)
    }
}

/// State of one `listen` call.
struct Running {
    generation: u64,
    handle: Handle,
    cancel: CancellationToken,
}

impl Running {
    fn stop(&self) {
        self.cancel.cancel();
        self.handle.shutdown();
    }
}

/// Echo server answering gRPC and plain HTTP on one socket.
pub struct EchoServer {
    config: ServerConfig,
    hostname: OnceLock<Arc<str>>,
    subscribers: Subscribers,
    running: Mutex<Option<Running>>,
    generation: AtomicU64,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl EchoServer {
    /// Create a server; subscriber churn is logged through `log_throttle`.
    pub fn new(config: ServerConfig, log_throttle: Throttle) -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            config,
            hostname: OnceLock::new(),
            subscribers: Subscribers::new(log_throttle, "server"),
            running: Mutex::new(None),
            generation: AtomicU64::new(0),
            bound,
        }
    }

    /// Host name reported in pongs, once resolved.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.get().map(|h| &**h)
    }

    /// Live subscriber counter.
    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    /// Address of the active listener, if serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.borrow()
    }

    /// Wait until a listener is bound and return its address.
    pub async fn listening(&self) -> Option<SocketAddr> {
        let mut rx = self.bound.subscribe();
        let addr = rx.wait_for(Option::is_some).await.ok()?;
        *addr
    }

    /// Bind and serve until [`close`](Self::close) is called.
    ///
    /// Any previous listener is closed first. Returns [`ServerError::Closed`]
    /// after a requested shutdown, including one that arrives while the
    /// listener is still starting.
    pub async fn listen(&self) -> Result<(), ServerError> {
        if self.config.subscribe_interval().is_zero() {
            return Err(ServerError::ZeroInterval);
        }

        let handle = Handle::new();
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Registered before the first await so a concurrent close can see it.
        let previous = self.lock().replace(Running {
            generation,
            handle: handle.clone(),
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.stop();
            self.bound.send_replace(None);
        }

        let result = self.serve(generation, handle, cancel.clone()).await;

        // Streams must stop even when serving ended on its own.
        cancel.cancel();
        self.release(generation);
        result
    }

    async fn serve(&self, generation: u64, handle: Handle, cancel: CancellationToken) -> Result<(), ServerError> {
        let hostname = self.resolve_hostname()?;
        let listener_config = &self.config.listener;

        // TLS material is checked before the socket exists.
        let tls_config = match &listener_config.tls {
            Some(tls_paths) => Some(tls::load_server_config(tls_paths).await?),
            None => None,
        };
        if cancel.is_cancelled() {
            return Err(ServerError::Closed);
        }

        let listener = BoundListener::bind(&listener_config.bind_address)?;
        let local_addr = listener.local_addr();
        {
            let running = self.lock();
            let current = running.as_ref().is_some_and(|r| r.generation == generation);
            if !current || cancel.is_cancelled() {
                tracing::debug!(address = %local_addr, "Closed during startup");
                return Err(ServerError::Closed);
            }
            self.bound.send_replace(Some(local_addr));
        }

        let service = Arc::new(EchoService::new(
            Arc::clone(&hostname),
            self.subscribers.clone(),
            self.config.subscribe_interval(),
            cancel,
        ));
        let router = ProtocolRouter::new(RpcHandler::new(Arc::clone(&service)), plain_router(service));
        let make_service = Shared::new(router);

        tracing::info!(
            address = %local_addr,
            tls = tls_config.is_some(),
            hostname = %hostname,
            "Echo server listening"
        );

        let result = match tls_config {
            Some(tls_config) => {
                axum_server::from_tcp_rustls(listener.into_std(), tls_config)
                    .handle(handle)
                    .serve(make_service)
                    .await
            }
            None => {
                axum_server::from_tcp(listener.into_std())
                    .handle(handle)
                    .serve(make_service)
                    .await
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(address = %local_addr, "Echo server stopped");
                Err(ServerError::Closed)
            }
            Err(e) => {
                tracing::error!(address = %local_addr, error = %e, "Echo server failed");
                Err(ServerError::Serve(e))
            }
        }
    }

    /// Stop serving and cancel every subscription.
    ///
    /// No-op when not listening; safe to call repeatedly and concurrently,
    /// including while `listen` is still starting.
    pub fn close(&self) {
        let running = self.lock().take();
        if let Some(running) = running {
            running.stop();
            self.bound.send_replace(None);
            tracing::info!("Echo server closing");
        }
    }

    fn resolve_hostname(&self) -> Result<Arc<str>, ServerError> {
        if let Some(hostname) = self.hostname.get() {
            return Ok(Arc::clone(hostname));
        }

        let resolved: Arc<str> = match self.config.hostname.as_deref() {
            Some(name) if !name.is_empty() => Arc::from(name),
            _ => {
                let name = hostname::get().map_err(ServerError::Hostname)?;
                Arc::from(name.to_string_lossy().into_owned())
            }
        };
        Ok(Arc::clone(self.hostname.get_or_init(|| resolved)))
    }

    /// Forget the running state if it still belongs to `generation`.
    fn release(&self, generation: u64) {
        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| r.generation == generation) {
            *running = None;
            self.bound.send_replace(None);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().expect("server state mutex poisoned")
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.close();
    }
}
