//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → token cancelled → server close / client subscriptions end
//! ```
//!
//! # Design Decisions
//! - One process-wide token; subsystems take child tokens
//! - Triggering is idempotent

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
