//! Graceful shutdown controller with in-flight session tracking.
//!
//! The controller coordinates teardown across the node:
//!
//! 1. the accept loop and every background task select on
//!    [`ShutdownController::receiver`]
//! 2. [`ShutdownController::trigger`] moves to `Draining` and signals
//!    them all (a `SHUTDOWN` command or a signal does this)
//! 3. [`ShutdownController::wait_for_drain`] blocks until the open
//!    client sessions finish their current exchange and exit

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Server lifecycle state.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Recovering the commit log; not yet accepting connections.
    Starting,
    /// Accepting connections and serving commands.
    Ready,
    /// Shutdown signalled; sessions are finishing up.
    Draining,
    /// All sessions drained; the process is about to exit.
    Stopped,
}

/// Coordinates graceful shutdown and tracks open client sessions.
#[derive(Debug)]
pub struct ShutdownController {
    signal: watch::Sender<bool>,
    sessions: Arc<AtomicU64>,
    state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _rx) = watch::channel(false);
        Self {
            signal,
            sessions: Arc::new(AtomicU64::new(0)),
            state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    /// Marks the node ready to accept connections.
    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Returns a receiver that fires when shutdown is triggered.
    #[must_use]
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// Initiates graceful shutdown: transitions to `Draining` and
    /// signals every receiver.
    pub fn trigger(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        // Receivers may already be gone; that is fine.
        let _ = self.signal.send(true);
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.signal.borrow()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HealthState {
        **self.state.load()
    }

    /// Registers an open client session.
    ///
    /// The session count drops when the guard does, panics included.
    #[must_use]
    pub fn session_guard(&self) -> InFlightGuard {
        self.sessions.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            sessions: Arc::clone(&self.sessions),
        }
    }

    /// Number of open client sessions.
    #[must_use]
    pub fn session_count(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Waits until every session has exited, up to `timeout`.
    ///
    /// Returns `true` on a clean drain (state becomes `Stopped`);
    /// `false` when the timeout expired with sessions still open.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.sessions.load(Ordering::Relaxed) == 0 {
                self.state.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one open session.
#[derive(Debug)]
pub struct InFlightGuard {
    sessions: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let controller = ShutdownController::new();
        assert_eq!(controller.state(), HealthState::Starting);
        assert!(!controller.is_shutting_down());

        controller.set_ready();
        assert_eq!(controller.state(), HealthState::Ready);

        controller.trigger();
        assert_eq!(controller.state(), HealthState::Draining);
        assert!(controller.is_shutting_down());
    }

    #[test]
    fn session_guards_count_up_and_down() {
        let controller = ShutdownController::new();
        assert_eq!(controller.session_count(), 0);

        let first = controller.session_guard();
        let second = controller.session_guard();
        assert_eq!(controller.session_count(), 2);

        drop(first);
        assert_eq!(controller.session_count(), 1);
        drop(second);
        assert_eq!(controller.session_count(), 0);
    }

    #[tokio::test]
    async fn receivers_observe_the_trigger() {
        let controller = ShutdownController::new();
        let mut rx = controller.receiver();
        assert!(!*rx.borrow());

        controller.trigger();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn drain_completes_when_sessions_exit() {
        let controller = ShutdownController::new();
        controller.set_ready();

        let guard = controller.session_guard();
        controller.trigger();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(2)).await);
        assert_eq!(controller.state(), HealthState::Stopped);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn drain_times_out_with_sessions_open() {
        let controller = ShutdownController::new();
        let _guard = controller.session_guard();
        controller.trigger();

        assert!(!controller.wait_for_drain(Duration::from_millis(50)).await);
        assert_eq!(controller.state(), HealthState::Draining);
    }
}
