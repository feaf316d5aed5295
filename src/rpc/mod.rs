//! gRPC echo service.
//!
//! # Data Flow
//! ```text
//! HTTP/2 request with application/grpc content type
//!     → service.rs (RpcHandler: path → method)
//!     → Send: build pong, echo metadata
//!     → Subscribe: subscribers.rs (+1) → stream.rs push loop → (-1)
//! ```
//!
//! # Design Decisions
//! - Messages are plain prost types; no build-time code generation
//! - One push task per subscription, cancelled from the server's token
//! - Subscriber churn is logged through a shared throttle

pub mod proto;
pub mod service;
pub mod stream;
pub mod subscribers;

pub use proto::{Ping, Pong};
pub use service::{EchoService, RpcHandler};
pub use stream::{StreamEnd, StreamLoop};
pub use subscribers::{SubscriberGuard, Subscribers};
