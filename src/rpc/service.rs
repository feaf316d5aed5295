//! Echo service implementation and its gRPC dispatch.
//!
//! # Responsibilities
//! - `Send`: echo the message with timestamp, hostname and caller metadata
//! - `Subscribe`: spawn one push loop per subscription and track it
//! - Plain probe: the same pong shape for non-RPC requests
//! - Route `/pb.Echo/*` paths onto tonic's unary/streaming machinery

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::codec::ProstCodec;
use tonic::server::{Grpc, ServerStreamingService, UnaryService};
use tonic::Status;

use crate::observability::metrics;
use crate::rpc::proto::{header_json, Ping, Pong, SEND_PATH, SUBSCRIBE_PATH};
use crate::rpc::stream::{receiver_stream, PongStream, StreamEnd, StreamLoop};
use crate::rpc::subscribers::Subscribers;

/// How long a cancelled subscription tries to deliver its closing status.
const CLOSE_NOTICE_TIMEOUT: Duration = Duration::from_millis(100);

/// Stateless echo logic plus the subscription bookkeeping it needs.
#[derive(Debug)]
pub struct EchoService {
    hostname: Arc<str>,
    subscribers: Subscribers,
    interval: Duration,
    shutdown: CancellationToken,
}

impl EchoService {
    /// `shutdown` is the parent of every subscription's cancellation token.
    pub fn new(
        hostname: Arc<str>,
        subscribers: Subscribers,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            hostname,
            subscribers,
            interval,
            shutdown,
        }
    }

    /// Unary echo.
    pub fn send(&self, request: tonic::Request<Ping>) -> Result<tonic::Response<Pong>, Status> {
        let headers = request.metadata().clone().into_headers();
        let ping = request.into_inner();

        let pong = Pong::now(ping.message.as_str(), &*self.hostname, headers_to_json(&headers));
        metrics::record_request("grpc", "Send");
        tracing::info!(request = ?ping, response = %pong, "Received grpc ping");

        Ok(tonic::Response::new(pong))
    }

    /// Server-streaming subscription.
    ///
    /// The counter slot is taken here and released by the push task on every
    /// exit path.
    pub fn subscribe(&self, request: tonic::Request<Ping>) -> Result<tonic::Response<PongStream>, Status> {
        let ping = request.into_inner();
        let guard = self.subscribers.enter();
        let cancel = self.shutdown.child_token();
        let looper = StreamLoop::new(ping.message, Arc::clone(&self.hostname), self.interval);
        let (tx, rx) = mpsc::channel(1);

        metrics::record_request("grpc", "Subscribe");
        tokio::spawn(async move {
            let (end, sent) = looper.run(&tx, &cancel).await;
            if end == StreamEnd::Cancelled {
                let status = Err(Status::unavailable("server closed"));
                let _ = tokio::time::timeout(CLOSE_NOTICE_TIMEOUT, tx.send(status)).await;
            }
            tracing::debug!(reason = %end, sent, "Subscription ended");

            // Release the slot before the stream observes its end.
            drop(guard);
            drop(tx);
        });

        Ok(tonic::Response::new(receiver_stream(rx)))
    }

    /// Pong for a plain HTTP request: no message, headers echoed.
    pub fn probe(&self, headers: &HeaderMap) -> Pong {
        metrics::record_request("http", "Probe");
        Pong::now(String::new(), &*self.hostname, headers_to_json(headers))
    }
}

fn headers_to_json(headers: &HeaderMap) -> String {
    header_json(headers.iter().map(|(name, value)| (name.as_str(), value.as_bytes())))
}

/// Tower service answering gRPC requests for `pb.Echo`.
#[derive(Debug, Clone)]
pub struct RpcHandler {
    service: Arc<EchoService>,
}

impl RpcHandler {
    pub fn new(service: Arc<EchoService>) -> Self {
        Self { service }
    }
}

impl tower::Service<Request<Body>> for RpcHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let service = Arc::clone(&self.service);
        let path = request.uri().path().to_owned();

        Box::pin(async move {
            let response = match path.as_str() {
                SEND_PATH => {
                    let mut grpc = Grpc::new(ProstCodec::default());
                    grpc.unary(SendMethod(service), request).await.map(Body::new)
                }
                SUBSCRIBE_PATH => {
                    let mut grpc = Grpc::new(ProstCodec::default());
                    grpc.server_streaming(SubscribeMethod(service), request)
                        .await
                        .map(Body::new)
                }
                other => {
                    tracing::warn!(path = %other, "Unknown grpc method");
                    unimplemented_response()
                }
            };
            Ok(response)
        })
    }
}

/// gRPC `UNIMPLEMENTED` trailers-only response.
fn unimplemented_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    headers.insert("grpc-status", HeaderValue::from(tonic::Code::Unimplemented as i32));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    response
}

struct SendMethod(Arc<EchoService>);

impl UnaryService<Ping> for SendMethod {
    type Response = Pong;
    type Future = BoxFuture<'static, Result<tonic::Response<Pong>, Status>>;

    fn call(&mut self, request: tonic::Request<Ping>) -> Self::Future {
        let service = Arc::clone(&self.0);
        Box::pin(async move { service.send(request) })
    }
}

struct SubscribeMethod(Arc<EchoService>);

impl ServerStreamingService<Ping> for SubscribeMethod {
    type Response = Pong;
    type ResponseStream = PongStream;
    type Future = BoxFuture<'static, Result<tonic::Response<PongStream>, Status>>;

    fn call(&mut self, request: tonic::Request<Ping>) -> Self::Future {
        let service = Arc::clone(&self.0);
        Box::pin(async move { service.subscribe(request) })
    }
}
