//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Listen address
//!     → tls.rs (optional: load cert/key, fail before bind)
//!     → listener.rs (resolve, bind, non-blocking socket)
//!     → Hand off to HTTP layer (protocol router)
//! ```
//!
//! # Design Decisions
//! - TLS material is validated before the socket exists
//! - TLS is optional and handled transparently for both protocols

pub mod listener;
pub mod tls;

pub use listener::{BoundListener, ListenerError};
pub use tls::TlsError;
