//! Plain HTTP probe handler.
//!
//! Answers every method and path with `200 OK` and the text rendering of a
//! pong whose header field echoes the request headers.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::IntoResponse,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::rpc::EchoService;

/// Build the router for non-RPC traffic.
pub fn plain_router(service: Arc<EchoService>) -> Router {
    Router::new()
        .fallback(probe_handler)
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

async fn probe_handler(
    State(service): State<Arc<EchoService>>,
    request: Request<Body>,
) -> impl IntoResponse {
    let pong = service.probe(request.headers());

    tracing::info!(
        version = ?request.version(),
        method = %request.method(),
        uri = %request.uri(),
        response = %pong,
        "Received http probe"
    );

    (StatusCode::OK, format!("{}\n", pong))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Throttle;
    use crate::rpc::Subscribers;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    #[tokio::test]
    async fn any_path_returns_pong_text() {
        let subscribers = Subscribers::new(Throttle::new(Duration::from_millis(10), true), "server");
        let service = EchoService::new(
            Arc::from("echo-1"),
            subscribers,
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        let router = plain_router(Arc::new(service));

        let request = Request::builder()
            .method("POST")
            .uri("/some/where?x=1")
            .header("x-probe", "yes")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("hostname:\"echo-1\""));
        assert!(text.contains("x-probe"));
        assert!(!text.contains("message:"));
    }
}
