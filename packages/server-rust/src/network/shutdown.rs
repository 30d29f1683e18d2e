//! Service lifecycle and in-flight request tracking.
//!
//! Probes read the lifecycle lock-free through an `ArcSwap`. Requests hold
//! an [`InFlightGuard`]; the last guard to drop wakes a pending drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// Where the service is in its life, independent of fetch recency.
///
/// Moves one way only: `Starting`, `Ready`, `Draining`, `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Bound or binding, not yet accepting traffic.
    Starting,
    Ready,
    /// New requests are refused while open ones finish.
    Draining,
    /// Nothing left in flight.
    Stopped,
}

impl LifecycleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Shared by the middleware, the health handlers and open event streams.
#[derive(Debug)]
pub struct ShutdownController {
    draining_tx: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
    state: ArcSwap<LifecycleState>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (draining_tx, _) = watch::channel(false);
        Self {
            draining_tx,
            in_flight: Arc::new(InFlight::default()),
            state: ArcSwap::from_pointee(LifecycleState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(LifecycleState::Ready));
    }

    /// Yields `true` once draining starts.
    ///
    /// Event streams select on this to close themselves; graceful shutdown
    /// would otherwise wait on them forever.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.draining_tx.subscribe()
    }

    /// Enters `Draining` and wakes every [`Self::shutdown_receiver`].
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(LifecycleState::Draining));
        // No receivers is fine.
        let _ = self.draining_tx.send(true);
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    /// Marks one request as open until the returned guard drops.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits until no request is open, giving up after `timeout`.
    ///
    /// On success the state becomes `Stopped` and this returns `true`.
    /// On timeout the state stays `Draining`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.in_flight.idle.notified();
                tokio::pin!(notified);
                // Register before checking, so a guard dropped in between
                // still wakes us.
                notified.as_mut().enable();
                if self.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        };

        if tokio::time::timeout(timeout, idle).await.is_err() {
            return false;
        }
        self.state.store(Arc::new(LifecycleState::Stopped));
        true
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Open-request marker from [`ShutdownController::in_flight_guard`].
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
