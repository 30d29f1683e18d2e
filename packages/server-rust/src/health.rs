//! Recency-based liveness tracking.
//!
//! The consumer records the time of every completed fetch cycle; the
//! liveness probe derives a verdict from how long ago that was. A process
//! that has never fetched is reported healthy: it has not yet had a chance
//! to be stale.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;

/// Health settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Maximum age of the last successful fetch before the process is
    /// reported unhealthy (inclusive).
    pub staleness_threshold_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_ms: 60_000,
        }
    }
}

/// Reporting view of the tracker at a point in time.
///
/// The time fields are omitted when no fetch has ever been registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
}

/// Process-wide record of the last successful fetch.
///
/// Constructed once at startup and shared via `Arc` with every request
/// handler and the liveness probe. The slot is an `ArcSwapOption`, so reads
/// never block writers. Concurrent registrations are last-writer-wins: a
/// slow request finishing late may move the recorded time backwards.
#[derive(Debug, Default)]
pub struct HealthTracker {
    last_success: ArcSwapOption<u64>,
}

impl HealthTracker {
    /// Creates a tracker with no fetch recorded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_success: ArcSwapOption::empty(),
        }
    }

    /// Overwrites the last-success time with `now` (ms since epoch).
    pub fn register_fetch(&self, now: u64) {
        self.last_success.store(Some(Arc::new(now)));
    }

    /// Returns the last registered time, if any.
    #[must_use]
    pub fn last_success_time(&self) -> Option<u64> {
        self.last_success.load_full().map(|t| *t)
    }

    /// Returns `true` if nothing was ever registered or the last
    /// registration is at most `threshold_ms` old.
    #[must_use]
    pub fn is_healthy(&self, now: u64, threshold_ms: u64) -> bool {
        self.status(now, threshold_ms).healthy
    }

    /// Combines the verdict with the data it was derived from.
    ///
    /// A registration later than `now` (clock skew) reads as age 0.
    #[must_use]
    pub fn status(&self, now: u64, threshold_ms: u64) -> HealthStatus {
        match self.last_success_time() {
            None => HealthStatus {
                healthy: true,
                last_success_time: None,
                age_ms: None,
            },
            Some(last) => {
                let age = now.saturating_sub(last);
                HealthStatus {
                    healthy: age <= threshold_ms,
                    last_success_time: Some(last),
                    age_ms: Some(age),
                }
            }
        }
    }
}
