//! gRPC echo server and client.
//!
//! # Architecture Overview
//!
//! ```text
//!     client (ping/subscribe)             server
//!     ───────────────────────             ──────────────────────────────────────────
//!     EchoClient ──h2c / h2+TLS──▶ net::listener ─▶ http::server (axum-server)
//!                                                       │
//!                                                       ▼
//!                                                 http::router ──classify──┐
//!                                                   │                      │
//!                                                   ▼ Rpc                  ▼ Plain
//!                                             rpc::RpcHandler        http::plain
//!                                             Send / Subscribe       200 + pong text
//!                                                   │
//!                                                   ▼
//!                                         rpc::stream (one task per subscription)
//!
//!     Cross-cutting: config (TOML + flags), observability (tracing, throttle,
//!     metrics), lifecycle (signals → shutdown token)
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use grpc_echo::client::{subscribe_concurrently, EchoClient};
use grpc_echo::config::{load_config, validate_config, ClientConfig, ConfigError, EchoConfig, TlsConfig};
use grpc_echo::http::EchoServer;
use grpc_echo::lifecycle::{wait_for_signal, Shutdown};
use grpc_echo::observability::{logging, metrics, Throttle};

#[derive(Debug, Parser)]
#[command(name = "grpc-echo", about = "gRPC echo client/server")]
struct Cli {
    /// TOML configuration file; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the echo server.
    Server(ServerArgs),
    /// Send one ping to an echo server.
    Ping(PingArgs),
    /// Subscribe to an echo server.
    Subscribe(SubscribeArgs),
    /// Print the version.
    Version,
}

#[derive(Debug, Args)]
struct ServerArgs {
    /// Listen address, e.g. ":8080" or "127.0.0.1:8080".
    #[arg(long)]
    addr: Option<String>,

    /// TLS certificate (PEM).
    #[arg(long = "cert")]
    cert_path: Option<String>,

    /// TLS private key (PEM).
    #[arg(long = "key")]
    key_path: Option<String>,

    /// Name reported in responses instead of the OS host name.
    #[arg(long)]
    hostname: Option<String>,

    /// Interval between subscription pushes, e.g. "1s".
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Server address.
    #[arg(long)]
    url: Option<String>,

    /// Ping message.
    #[arg(long, default_value = "")]
    message: String,

    /// CA certificate (PEM) used to verify the server; enables TLS.
    #[arg(long = "cert")]
    ca_cert_path: Option<String>,

    /// Skip certificate chain and host name verification; enables TLS.
    #[arg(long)]
    insecure_skip_verify: bool,

    /// Extra metadata as key=value; repeatable.
    #[arg(long = "header")]
    headers: Vec<String>,
}

impl TargetArgs {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.url {
            config.target = url.clone();
        }
        if let Some(path) = &self.ca_cert_path {
            config.ca_cert_path = Some(path.clone());
        }
        if self.insecure_skip_verify {
            config.insecure_skip_verify = true;
        }
        config.metadata.extend(self.headers.iter().cloned());
    }
}

#[derive(Debug, Args)]
struct PingArgs {
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Args)]
struct SubscribeArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// How long to stay subscribed, e.g. "10m".
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Parallel subscriptions.
    #[arg(long)]
    concurrent: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EchoConfig::default(),
    };
    apply_overrides(&mut config, &cli.command);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "grpc-echo starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let throttle = Throttle::with_cancellation(
        config.logging.throttle_window(),
        config.logging.throttle_trailing,
        shutdown.subscribe(),
    );

    match cli.command {
        Command::Server(_) => run_server(config, throttle, shutdown).await,
        Command::Ping(args) => {
            let client = EchoClient::connect(&config.client, throttle).await?;
            let pong = client.ping(&args.target.message).await?;
            println!("{pong}");
            Ok(())
        }
        Command::Subscribe(args) => {
            let duration = args.duration.unwrap_or_else(|| config.client.subscribe_duration());
            let received = subscribe_concurrently(
                &config.client,
                &args.target.message,
                duration,
                config.client.concurrency,
                throttle,
                &shutdown.subscribe(),
            )
            .await?;
            tracing::info!(received, "Subscription finished");
            Ok(())
        }
        Command::Version => Ok(()),
    }
}

fn apply_overrides(config: &mut EchoConfig, command: &Command) {
    match command {
        Command::Server(args) => {
            let server = &mut config.server;
            if let Some(addr) = &args.addr {
                server.listener.bind_address = addr.clone();
            }
            if args.cert_path.is_some() || args.key_path.is_some() {
                server.listener.tls = TlsConfig::from_paths(
                    args.cert_path.as_deref().unwrap_or_default(),
                    args.key_path.as_deref().unwrap_or_default(),
                );
            }
            if let Some(hostname) = &args.hostname {
                server.hostname = Some(hostname.clone());
            }
            if let Some(interval) = args.interval {
                server.subscribe_interval_ms = interval.as_millis() as u64;
            }
        }
        Command::Ping(args) => args.target.apply(&mut config.client),
        Command::Subscribe(args) => {
            args.target.apply(&mut config.client);
            if let Some(concurrent) = args.concurrent {
                config.client.concurrency = concurrent;
            }
        }
        Command::Version => {}
    }
}

async fn run_server(config: EchoConfig, throttle: Throttle, shutdown: Shutdown) -> Result<(), Box<dyn Error>> {
    let server = EchoServer::new(config.server, throttle);

    let listen = server.listen();
    tokio::pin!(listen);

    // Polling listen first registers it before a shutdown can be observed.
    let result = tokio::select! {
        biased;
        result = &mut listen => result,
        _ = shutdown.triggered() => {
            server.close();
            listen.await
        }
    };

    match result {
        Err(e) if e.is_closed() => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => Err(e.into()),
        Ok(()) => Ok(()),
    }
}
