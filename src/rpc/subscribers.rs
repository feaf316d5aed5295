//! Live subscriber accounting.
//!
//! # Responsibilities
//! - Count active streaming subscriptions
//! - Guarantee the count is released on every exit path
//! - Log count changes through a shared throttle

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::observability::{metrics, Throttle};

/// Shared subscriber counter.
///
/// Cloning shares the count and the throttle.
#[derive(Debug, Clone)]
pub struct Subscribers {
    count: Arc<AtomicI64>,
    throttle: Throttle,
    side: &'static str,
}

impl Subscribers {
    /// Create a counter that logs changes through `throttle`.
    ///
    /// `side` labels the log line ("server" or "client").
    pub fn new(throttle: Throttle, side: &'static str) -> Self {
        Self {
            count: Arc::new(AtomicI64::new(0)),
            throttle,
            side,
        }
    }

    /// Record a new subscription. The returned guard releases it on drop.
    pub fn enter(&self) -> SubscriberGuard {
        self.change(1);
        SubscriberGuard {
            subscribers: self.clone(),
        }
    }

    /// Current number of active subscriptions.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    fn change(&self, delta: i64) {
        self.count.fetch_add(delta, Ordering::SeqCst);

        // The line reports the count at the time it is written, so a trailing
        // call shows the settled value after a burst.
        let count = Arc::clone(&self.count);
        let side = self.side;
        self.throttle.trigger(move || {
            let current = count.load(Ordering::SeqCst);
            metrics::record_subscribers(current);
            tracing::info!(side, subscribers = current, "Subscriber count changed");
        });
    }
}

/// Releases one subscription slot when dropped.
#[derive(Debug)]
pub struct SubscriberGuard {
    subscribers: Subscribers,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.subscribers.change(-1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn guard_counts() {
        let subscribers = Subscribers::new(Throttle::new(Duration::from_millis(10), true), "server");
        assert_eq!(subscribers.count(), 0);

        let guard1 = subscribers.enter();
        assert_eq!(subscribers.count(), 1);

        let guard2 = subscribers.enter();
        assert_eq!(subscribers.count(), 2);

        drop(guard1);
        assert_eq!(subscribers.count(), 1);

        drop(guard2);
        assert_eq!(subscribers.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pairs_net_to_zero() {
        let subscribers = Subscribers::new(Throttle::new(Duration::from_millis(10), true), "server");

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..64u64 {
            let subscribers = subscribers.clone();
            tasks.spawn(async move {
                let _guard = subscribers.enter();
                assert!(subscribers.count() > 0);
                tokio::time::sleep(Duration::from_millis(i % 5)).await;
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        assert_eq!(subscribers.count(), 0);
    }
}
