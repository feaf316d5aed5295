//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handlers and subscription streams produce:
//!     → logging.rs (structured log events)
//!     → throttle.rs (coalesces bursty events before they reach the log)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log sink (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging via `tracing` fields, never pre-formatted strings
//! - High-frequency events (subscriber churn, stream receipts) go through a
//!   `Throttle` instance owned by the component that emits them
//! - Metrics are cheap (atomic increments) and no-ops without an exporter

pub mod logging;
pub mod metrics;
pub mod throttle;

pub use throttle::Throttle;
