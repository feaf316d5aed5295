//! gRPC echo client.
//!
//! # Data Flow
//! ```text
//! ClientConfig
//!     → transport.rs (target, TLS, metadata → Channel)
//!     → EchoClient::ping       (unary Send)
//!     → EchoClient::subscribe  (Subscribe, bounded by duration/cancel)
//!     → subscribe_concurrently (N subscriptions, first error cancels all)
//! ```
//!
//! # Design Decisions
//! - Calls go through `tonic::client::Grpc` with explicit paths; no codegen
//! - End of stream, timeout and cancellation all end a subscription cleanly
//! - Per-message logging goes through a throttle

pub mod transport;

use std::time::Duration;

use axum::http::uri::PathAndQuery;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::{Code, Status};

use crate::config::ClientConfig;
use crate::net::TlsError;
use crate::observability::Throttle;
use crate::rpc::proto::{Ping, Pong, SEND_PATH, SUBSCRIBE_PATH};
use crate::rpc::Subscribers;

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    #[error("invalid metadata entry {0:?}")]
    InvalidMetadata(String),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsError),

    #[error("connection failed: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("rpc failed: {0}")]
    Status(Box<Status>),

    #[error("subscription task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Status(Box::new(status))
    }
}

/// Connected echo client.
#[derive(Debug, Clone)]
pub struct EchoClient {
    channel: Channel,
    target: String,
    tls: bool,
    metadata: MetadataMap,
    throttle: Throttle,
}

impl EchoClient {
    /// Dial the configured target. Received pongs are logged via `throttle`.
    pub async fn connect(config: &ClientConfig, throttle: Throttle) -> Result<Self, ClientError> {
        let metadata = transport::build_metadata(&config.metadata)?;
        let channel = transport::connect_channel(config).await?;

        Ok(Self {
            channel,
            target: config.target.clone(),
            tls: transport::wants_tls(config),
            metadata,
            throttle,
        })
    }

    async fn grpc(&self) -> Result<Grpc<Channel>, ClientError> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready().await?;
        Ok(grpc)
    }

    fn request(&self, message: &str) -> tonic::Request<Ping> {
        let mut request = tonic::Request::new(Ping::new(message));
        *request.metadata_mut() = self.metadata.clone();
        request
    }

    /// Unary echo.
    pub async fn ping(&self, message: &str) -> Result<Pong, ClientError> {
        let mut grpc = self.grpc().await?;
        let response: tonic::Response<Pong> = grpc
            .unary(
                self.request(message),
                PathAndQuery::from_static(SEND_PATH),
                ProstCodec::default(),
            )
            .await?;
        let pong = response.into_inner();

        let (target, tls, message, logged) = (self.target.clone(), self.tls, message.to_string(), pong.clone());
        self.throttle.trigger(move || {
            tracing::info!(server = %target, tls, ping = ?message, response = %logged, "Ping answered");
        });

        Ok(pong)
    }

    /// Subscribe and receive until the stream ends, `duration` elapses or
    /// `cancel` fires. Returns the number of pongs received.
    pub async fn subscribe(
        &self,
        message: &str,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<u64, ClientError> {
        let mut grpc = self.grpc().await?;
        let response: tonic::Response<tonic::codec::Streaming<Pong>> = grpc
            .server_streaming(
                self.request(message),
                PathAndQuery::from_static(SUBSCRIBE_PATH),
                ProstCodec::default(),
            )
            .await?;
        let mut stream = response.into_inner();

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        let mut received = 0u64;

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(received),
                _ = &mut deadline => return Ok(received),
                item = stream.message() => item,
            };

            match item {
                Ok(Some(pong)) => {
                    received += 1;
                    let (target, message) = (self.target.clone(), message.to_string());
                    self.throttle.trigger(move || {
                        tracing::info!(server = %target, ping = ?message, response = %pong, "Subscription received");
                    });
                }
                Ok(None) => return Ok(received),
                Err(status) if status.code() == Code::Cancelled => return Ok(received),
                Err(status) => return Err(status.into()),
            }
        }
    }
}

/// Run `concurrency` subscriptions in parallel, each on its own connection.
///
/// The first failure cancels the others and is returned; otherwise the total
/// number of pongs received is returned.
pub async fn subscribe_concurrently(
    config: &ClientConfig,
    message: &str,
    duration: Duration,
    concurrency: usize,
    throttle: Throttle,
    cancel: &CancellationToken,
) -> Result<u64, ClientError> {
    let subscribers = Subscribers::new(throttle.clone(), "client");
    let group = cancel.child_token();
    let mut tasks = JoinSet::new();

    for _ in 0..concurrency.max(1) {
        let config = config.clone();
        let message = message.to_string();
        let throttle = throttle.clone();
        let subscribers = subscribers.clone();
        let group = group.clone();

        tasks.spawn(async move {
            let _guard = subscribers.enter();
            let client = EchoClient::connect(&config, throttle).await?;
            client.subscribe(&message, duration, &group).await
        });
    }

    let mut total = 0;
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined.map_err(ClientError::from).and_then(|result| result) {
            Ok(received) => total += received,
            Err(e) => {
                if first_error.is_none() {
                    tracing::warn!(error = %e, "Subscription failed, cancelling the rest");
                    group.cancel();
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(total),
    }
}
