//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use grpc_echo::config::{ClientConfig, ServerConfig, TlsConfig};
use grpc_echo::http::{EchoServer, ServerError};
use grpc_echo::observability::Throttle;

pub const HOSTNAME: &str = "echo-test-host";

/// Self-signed certificate for `localhost` and `127.0.0.1`, kept on disk
/// for as long as the value lives.
pub struct TestCerts {
    _dir: TempDir,
    pub cert_path: String,
    pub key_path: String,
}

impl TestCerts {
    pub fn generate() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ])
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cert_path = write(dir.path(), "cert.pem", &certified.cert.pem());
        let key_path = write(dir.path(), "key.pem", &certified.key_pair.serialize_pem());

        Self {
            _dir: dir,
            cert_path,
            key_path,
        }
    }

    pub fn tls_config(&self) -> Option<TlsConfig> {
        TlsConfig::from_paths(&self.cert_path, &self.key_path)
    }
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

pub fn throttle() -> Throttle {
    Throttle::new(Duration::from_millis(50), true)
}

pub fn server_config(tls: Option<TlsConfig>, interval: Duration) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.tls = tls;
    config.hostname = Some(HOSTNAME.to_string());
    config.subscribe_interval_ms = interval.as_millis() as u64;
    config
}

pub fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        target: addr.to_string(),
        ..ClientConfig::default()
    }
}

/// A server running `listen` on a background task.
pub struct TestServer {
    pub server: Arc<EchoServer>,
    pub addr: SocketAddr,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> Self {
        let server = Arc::new(EchoServer::new(config, throttle()));
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.listen().await })
        };

        let addr = tokio::time::timeout(Duration::from_secs(5), server.listening())
            .await
            .expect("server did not start listening")
            .unwrap();

        Self { server, addr, task }
    }

    /// Close the server and return what `listen` returned.
    pub async fn stop(self) -> ServerError {
        self.server.close();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("listen did not return after close")
            .unwrap()
            .unwrap_err()
    }
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
