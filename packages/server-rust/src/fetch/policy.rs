//! Fetch policies and the call-site presets built from them.

use std::time::Duration;

use sensorlink_core::{ClockSource, Measurement};

/// Fetch settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Time budget for a single attempt.
    pub timeout: Duration,
    /// Retries after the initial attempt, for call sites that retry.
    pub max_retries: u32,
    /// Pause between attempts. Zero means immediate retry.
    pub backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            max_retries: 10,
            backoff: Duration::ZERO,
        }
    }
}

/// Rule for building the substitute measurement once retries are exhausted.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    /// A fresh random reading stamped with the current time, shaped exactly
    /// like real data.
    Synthesized,
    /// A fixed measurement returned as-is.
    Fixed(Measurement),
}

impl Fallback {
    /// Builds the fallback measurement.
    #[must_use]
    pub fn produce(&self, clock: &dyn ClockSource) -> Measurement {
        match self {
            Self::Synthesized => Measurement::synthesize(clock),
            Self::Fixed(m) => m.clone(),
        }
    }
}

/// Failure policy for one call site.
///
/// Timeout, retry, and fallback are independent: any subset may be enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    /// Per-attempt time budget. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Retries after the initial attempt. 0 disables retry.
    pub max_retries: u32,
    /// Pause between attempts.
    pub backoff: Duration,
    /// Substitute returned when every attempt failed. `None` surfaces the error.
    pub fallback: Option<Fallback>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(500)),
            max_retries: 0,
            backoff: Duration::ZERO,
            fallback: None,
        }
    }
}

impl FetchPolicy {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Initial attempt plus retries.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// The consumer's call sites, each with its own policy subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    /// Flaky producer endpoint: timeout and retry.
    Sensor,
    /// Slow producer endpoint: timeout only.
    Slow,
    /// Slow producer endpoint: timeout and fallback.
    Fallback,
}

impl CallSite {
    pub const ALL: [CallSite; 3] = [Self::Sensor, Self::Slow, Self::Fallback];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Slow => "slow",
            Self::Fallback => "fallback",
        }
    }

    /// Producer path this call site fetches from.
    #[must_use]
    pub fn producer_path(self) -> &'static str {
        match self {
            Self::Sensor => "/data",
            Self::Slow | Self::Fallback => "/data/slow",
        }
    }

    /// Builds this call site's policy from the loaded configuration.
    #[must_use]
    pub fn policy(self, config: &FetchConfig) -> FetchPolicy {
        let base = FetchPolicy::default().with_timeout(config.timeout);
        match self {
            Self::Sensor => base.with_retries(config.max_retries, config.backoff),
            Self::Slow => base,
            Self::Fallback => base.with_fallback(Fallback::Synthesized),
        }
    }
}
