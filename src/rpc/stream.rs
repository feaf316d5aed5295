//! Subscription push loop.
//!
//! # State Machine
//! ```text
//! RUNNING ──tick──▶ build pong ──send ok──▶ RUNNING
//!    │                   │
//!    │ cancelled         │ send failed / cancelled
//!    ▼                   ▼
//! TERMINATED ◀───────────┘
//! ```
//!
//! # Design Decisions
//! - Cancellation is checked at every tick boundary and wins against a
//!   pending send
//! - One pong in flight at a time; a slow receiver delays the next tick
//!   instead of causing a catch-up burst
//! - The ticker is owned by the loop and dropped on every exit

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::observability::metrics;
use crate::rpc::proto::Pong;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Items flowing to a subscriber.
pub type PongItem = Result<Pong, Status>;

/// Response stream handed to the gRPC layer.
pub type PongStream = Pin<Box<dyn Stream<Item = PongItem> + Send + 'static>>;

/// Why a subscription loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamEnd {
    /// The cancellation token fired (server close or process shutdown).
    #[error("subscription cancelled")]
    Cancelled,

    /// The receiving side went away; the send failed.
    #[error("subscriber disconnected")]
    Disconnected,
}

/// Timed push loop for one subscription.
#[derive(Debug, Clone)]
pub struct StreamLoop {
    message: String,
    hostname: Arc<str>,
    interval: Duration,
}

impl StreamLoop {
    /// A zero `interval` is raised to one millisecond; tokio timers reject
    /// a zero period.
    pub fn new(message: String, hostname: Arc<str>, interval: Duration) -> Self {
        Self {
            message,
            hostname,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Push one pong per interval into `tx` until cancelled or disconnected.
    ///
    /// Returns the reason the loop ended together with the number of pongs
    /// delivered.
    pub async fn run(&self, tx: &mpsc::Sender<PongItem>, cancel: &CancellationToken) -> (StreamEnd, u64) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (StreamEnd::Cancelled, sent),
                _ = tx.closed() => return (StreamEnd::Disconnected, sent),
                _ = ticker.tick() => {}
            }

            let pong = Pong::now(self.message.as_str(), &*self.hostname, String::new());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (StreamEnd::Cancelled, sent),
                result = tx.send(Ok(pong)) => {
                    if result.is_err() {
                        return (StreamEnd::Disconnected, sent);
                    }
                }
            }

            sent += 1;
            metrics::record_stream_message();
        }
    }
}

/// Adapt a receiver into a response stream.
pub fn receiver_stream(rx: mpsc::Receiver<PongItem>) -> PongStream {
    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}
