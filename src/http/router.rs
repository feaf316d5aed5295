//! Per-request protocol classification on the shared listener.
//!
//! # Responsibilities
//! - Decide whether a request is gRPC or plain HTTP
//! - Delegate to the matching handler service
//!
//! Both handlers are peers: any `tower::Service` answering
//! `Request<Body>` with `Response<Body>` can sit on either side.

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes, HttpBody};
use axum::http::{header, Request, Response, Version};
use axum::BoxError;
use futures_util::future::BoxFuture;
use tower::{Service, ServiceExt};

/// Content type prefix announcing gRPC framing.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Which handler a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Rpc,
    Plain,
}

/// Classify a request: HTTP/2 with a gRPC content type is RPC, all else plain.
pub fn classify<B>(request: &Request<B>) -> Protocol {
    let is_grpc = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains(GRPC_CONTENT_TYPE));

    if request.version() == Version::HTTP_2 && is_grpc {
        Protocol::Rpc
    } else {
        Protocol::Plain
    }
}

/// Dispatcher sitting directly behind the connection layer.
#[derive(Debug, Clone)]
pub struct ProtocolRouter<R, P> {
    rpc: R,
    plain: P,
}

impl<R, P> ProtocolRouter<R, P> {
    pub fn new(rpc: R, plain: P) -> Self {
        Self { rpc, plain }
    }
}

impl<R, P, B> Service<Request<B>> for ProtocolRouter<R, P>
where
    R: Service<Request<Body>, Response = Response<Body>, Error = Infallible> + Clone + Send + 'static,
    R::Future: Send + 'static,
    P: Service<Request<Body>, Response = Response<Body>, Error = Infallible> + Clone + Send + 'static,
    P::Future: Send + 'static,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let request = request.map(Body::new);
        match classify(&request) {
            Protocol::Rpc => Box::pin(self.rpc.clone().oneshot(request)),
            Protocol::Plain => Box::pin(self.plain.clone().oneshot(request)),
        }
    }
}
