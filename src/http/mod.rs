//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (HTTP/1.1, h2c, or h2 over TLS)
//!     → server.rs (axum-server, lifecycle)
//!     → router.rs (classify: gRPC or plain)
//!         → rpc::RpcHandler (application/grpc over HTTP/2)
//!         → plain.rs (everything else: 200 + pong text)
//! ```

pub mod plain;
pub mod router;
pub mod server;

pub use router::{classify, Protocol, ProtocolRouter};
pub use server::{EchoServer, ServerError};
