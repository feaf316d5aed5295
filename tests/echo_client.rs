//! Client/server integration tests over gRPC.

use std::time::Duration;

use axum::http::uri::PathAndQuery;
use tokio_util::sync::CancellationToken;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::Code;

use grpc_echo::client::{subscribe_concurrently, EchoClient};
use grpc_echo::rpc::proto::{unix_now, Ping, Pong};

mod common;

use common::{client_config, eventually, server_config, throttle, TestCerts, TestServer, HOSTNAME};

#[tokio::test]
async fn unary_ping_clear_text() {
    let server = TestServer::start(server_config(None, Duration::from_secs(1))).await;

    let mut config = client_config(server.addr);
    config.metadata = vec!["x-env=staging".to_string(), "ignored".to_string()];
    let client = EchoClient::connect(&config, throttle()).await.unwrap();

    let pong = client.ping("abc").await.unwrap();
    assert_eq!(pong.message, "abc");
    assert_eq!(pong.hostname, HOSTNAME);
    assert!((pong.timestamp - unix_now()).abs() <= 2);

    let header: serde_json::Value = serde_json::from_str(&pong.header).unwrap();
    assert_eq!(header["x-env"], serde_json::json!(["staging"]));

    server.stop().await;
}

#[tokio::test]
async fn unary_ping_tls_skip_verify() {
    let certs = TestCerts::generate();
    let server = TestServer::start(server_config(certs.tls_config(), Duration::from_secs(1))).await;

    let mut config = client_config(server.addr);
    config.insecure_skip_verify = true;
    let client = EchoClient::connect(&config, throttle()).await.unwrap();

    let pong = client.ping("abc").await.unwrap();
    assert_eq!(pong.message, "abc");
    assert_eq!(pong.hostname, HOSTNAME);

    server.stop().await;
}

#[tokio::test]
async fn unary_ping_tls_with_ca_certificate() {
    let certs = TestCerts::generate();
    let server = TestServer::start(server_config(certs.tls_config(), Duration::from_secs(1))).await;

    let mut config = client_config(server.addr);
    config.ca_cert_path = Some(certs.cert_path.clone());
    let client = EchoClient::connect(&config, throttle()).await.unwrap();

    let pong = client.ping("verified").await.unwrap();
    assert_eq!(pong.message, "verified");

    server.stop().await;
}

#[tokio::test]
async fn unknown_method_is_unimplemented() {
    let server = TestServer::start(server_config(None, Duration::from_secs(1))).await;

    let channel = tonic::transport::Endpoint::from_shared(format!("http://{}", server.addr))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let mut grpc = Grpc::new(channel);
    grpc.ready().await.unwrap();

    let result: Result<tonic::Response<Pong>, _> = grpc
        .unary(
            tonic::Request::new(Ping::new("x")),
            PathAndQuery::from_static("/pb.Echo/Missing"),
            ProstCodec::default(),
        )
        .await;
    assert_eq!(result.unwrap_err().code(), Code::Unimplemented);

    server.stop().await;
}

#[tokio::test]
async fn subscription_count_follows_interval() {
    let server = TestServer::start(server_config(None, Duration::from_millis(100))).await;
    let client = EchoClient::connect(&client_config(server.addr), throttle()).await.unwrap();

    let received = client
        .subscribe("tick", Duration::from_millis(550), &CancellationToken::new())
        .await
        .unwrap();
    assert!((4..=6).contains(&received), "received {received}");

    assert!(eventually(Duration::from_secs(2), || server.server.subscribers().count() == 0).await);
    server.stop().await;
}

#[tokio::test]
async fn subscription_over_tls() {
    let certs = TestCerts::generate();
    let server = TestServer::start(server_config(certs.tls_config(), Duration::from_millis(50))).await;

    let mut config = client_config(server.addr);
    config.insecure_skip_verify = true;
    let client = EchoClient::connect(&config, throttle()).await.unwrap();

    let received = client
        .subscribe("tls", Duration::from_millis(300), &CancellationToken::new())
        .await
        .unwrap();
    assert!(received >= 3, "received {received}");

    server.stop().await;
}

#[tokio::test]
async fn client_cancellation_ends_subscription_cleanly() {
    let server = TestServer::start(server_config(None, Duration::from_millis(20))).await;
    let client = EchoClient::connect(&client_config(server.addr), throttle()).await.unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { client.subscribe("c", Duration::from_secs(60), &cancel).await })
    };

    assert!(eventually(Duration::from_secs(2), || server.server.subscribers().count() == 1).await);
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(eventually(Duration::from_secs(2), || server.server.subscribers().count() == 0).await);
    server.stop().await;
}

#[tokio::test]
async fn close_ends_active_subscriptions() {
    let server = TestServer::start(server_config(None, Duration::from_millis(20))).await;
    let client = EchoClient::connect(&client_config(server.addr), throttle()).await.unwrap();

    let task = tokio::spawn(async move {
        client
            .subscribe("s", Duration::from_secs(60), &CancellationToken::new())
            .await
    });
    assert!(eventually(Duration::from_secs(2), || server.server.subscribers().count() == 1).await);

    let subscribers = server.server.clone();
    assert!(server.stop().await.is_closed());

    // The stream ends promptly; how it ends depends on the connection teardown.
    let _ = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || subscribers.subscribers().count() == 0).await);
}

#[tokio::test]
async fn concurrent_subscriptions_all_receive() {
    let server = TestServer::start(server_config(None, Duration::from_millis(100))).await;

    let total = subscribe_concurrently(
        &client_config(server.addr),
        "many",
        Duration::from_millis(350),
        3,
        throttle(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!((6..=12).contains(&total), "total {total}");

    assert!(eventually(Duration::from_secs(2), || server.server.subscribers().count() == 0).await);
    server.stop().await;
}

#[tokio::test]
async fn concurrent_subscriptions_fail_fast_without_server() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let result = subscribe_concurrently(
        &client_config(addr),
        "nobody",
        Duration::from_secs(5),
        2,
        throttle(),
        &CancellationToken::new(),
    )
    .await;
    assert!(result.is_err());
}
