//! Trailing-edge throttle for coalescing bursty log output.
//!
//! # Responsibilities
//! - Run the first triggered action immediately (leading edge)
//! - Collapse every further trigger inside the window into one deferred action
//! - Reopen the window after a deferred action so bursts keep coalescing
//!
//! # Design Decisions
//! - One mutex guards the pending slot and the window flag
//! - Actions always run outside the lock, so an action may trigger again
//! - One Tokio task per open window acts as the timer
//!
//! Under sustained triggering the window reopens after every deferred action,
//! so a continuously fed throttle never settles and keeps trailing.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Action = Box<dyn FnOnce() + Send + 'static>;

/// Coalesces repeated actions into at most one leading and one trailing call
/// per window.
///
/// Cloning is cheap and clones share the same window.
#[derive(Clone)]
pub struct Throttle {
    inner: Arc<Inner>,
}

struct Inner {
    window: Duration,
    trailing: bool,
    cancel: CancellationToken,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    open: bool,
    pending: Option<Action>,
}

impl Throttle {
    /// Create a throttle that lives until the process exits.
    pub fn new(window: Duration, trailing: bool) -> Self {
        Self::with_cancellation(window, trailing, CancellationToken::new())
    }

    /// Create a throttle whose timer stops once `cancel` fires.
    ///
    /// After cancellation every trigger runs inline without coalescing.
    pub fn with_cancellation(window: Duration, trailing: bool, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                trailing,
                cancel,
                state: Mutex::new(WindowState::default()),
            }),
        }
    }

    /// Whether a window is currently open.
    pub fn is_window_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Trigger `action` through the throttle.
    ///
    /// Outside a Tokio runtime there is no timer, so the action runs inline.
    pub fn trigger<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.window.is_zero() || self.inner.cancel.is_cancelled() {
            action();
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            action();
            return;
        };

        {
            let mut state = self.inner.lock();
            if state.open {
                if self.inner.trailing {
                    state.pending = Some(Box::new(action));
                }
                return;
            }
            state.open = true;
            state.pending = None;
        }

        runtime.spawn(run_window(Arc::clone(&self.inner)));
        action();
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("window", &self.inner.window)
            .field("trailing", &self.inner.trailing)
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().expect("throttle mutex poisoned")
    }
}

/// Timer task for one open window and every window reopened after it.
async fn run_window(inner: Arc<Inner>) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                let mut state = inner.lock();
                state.pending = None;
                state.open = false;
                return;
            }
            _ = tokio::time::sleep(inner.window) => {}
        }

        let next = {
            let mut state = inner.lock();
            match state.pending.take() {
                Some(action) => action,
                None => {
                    state.open = false;
                    return;
                }
            }
        };

        next();
    }
}
