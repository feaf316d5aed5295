//! gRPC/HTTP echo server and client library.

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;

pub use client::{EchoClient, ClientError};
pub use config::schema::EchoConfig;
pub use http::{EchoServer, ServerError};
pub use lifecycle::Shutdown;
pub use observability::Throttle;
