//! The retry loop.
//!
//! Each attempt is raced against the policy timeout with
//! `tokio::time::timeout`; dropping the losing future abandons the in-flight
//! exchange and releases its connection. No shared lock is held while
//! waiting, so concurrent fetches have independent budgets.

use std::sync::Arc;
use std::time::Instant;

use sensorlink_core::{ClockSource, DecodeError, Measurement, MeasurementSource, SourceError};
use tracing::{debug, info_span, warn, Instrument};

use super::error::{AttemptError, FetchError};
use super::policy::{CallSite, FetchConfig, FetchPolicy};

/// How a completed fetch produced its measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Measurement),
    FallbackUsed(Measurement),
}

/// A completed fetch together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub outcome: FetchOutcome,
    pub attempts: u32,
}

impl Fetched {
    /// Attempts beyond the initial one.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    #[must_use]
    pub fn fallback_used(&self) -> bool {
        matches!(self.outcome, FetchOutcome::FallbackUsed(_))
    }

    #[must_use]
    pub fn into_measurement(self) -> Measurement {
        match self.outcome {
            FetchOutcome::Success(m) | FetchOutcome::FallbackUsed(m) => m,
        }
    }
}

/// Why one attempt did not yield a measurement.
enum AttemptFailure {
    /// Retrying cannot fix a malformed payload.
    Fatal(DecodeError),
    Retryable(AttemptError),
}

/// Fetches measurements from a producer under a [`FetchPolicy`].
pub struct ResilientFetchClient {
    source: Arc<dyn MeasurementSource>,
    call_site: CallSite,
    policy: FetchPolicy,
    clock: Arc<dyn ClockSource>,
}

impl ResilientFetchClient {
    /// Creates a client for `call_site` with an explicit policy.
    #[must_use]
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        call_site: CallSite,
        policy: FetchPolicy,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            source,
            call_site,
            policy,
            clock,
        }
    }

    /// Creates a client using the call site's preset policy.
    #[must_use]
    pub fn for_call_site(
        source: Arc<dyn MeasurementSource>,
        call_site: CallSite,
        config: &FetchConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self::new(source, call_site, call_site.policy(config), clock)
    }

    #[must_use]
    pub fn call_site(&self) -> CallSite {
        self.call_site
    }

    #[must_use]
    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetches the latest measurement.
    ///
    /// # Errors
    ///
    /// See [`ResilientFetchClient::fetch_detailed`].
    pub async fn fetch(&self) -> Result<Measurement, FetchError> {
        self.fetch_detailed().await.map(Fetched::into_measurement)
    }

    /// Fetches the latest measurement and reports how it was obtained.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Decode`] as soon as the producer returns a malformed
    ///   payload, regardless of the retry budget.
    /// - [`FetchError::RemoteUnavailable`] when every attempt timed out or
    ///   failed and the policy has no fallback.
    pub async fn fetch_detailed(&self) -> Result<Fetched, FetchError> {
        let site = self.call_site.as_str();
        let span = info_span!(
            "fetch",
            call_site = site,
            path = self.call_site.producer_path(),
            attempts = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = self.run_attempts().await;

            let (attempts, outcome) = match &result {
                Ok(fetched) if fetched.fallback_used() => (Some(fetched.attempts), "fallback"),
                Ok(fetched) => (Some(fetched.attempts), "success"),
                Err(FetchError::RemoteUnavailable { attempts, .. }) => {
                    (Some(*attempts), "remote_unavailable")
                }
                Err(FetchError::Decode(_)) => (None, "decode_error"),
            };
            let span = tracing::Span::current();
            if let Some(attempts) = attempts {
                span.record("attempts", attempts);
            }
            span.record("outcome", outcome);

            metrics::histogram!("sensorlink_fetch_duration_seconds", "call_site" => site)
                .record(start.elapsed().as_secs_f64());
            debug!(?attempts, outcome, "fetch complete");

            result
        }
        .instrument(span)
        .await
    }

    async fn run_attempts(&self) -> Result<Fetched, FetchError> {
        let site = self.call_site.as_str();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        let last = loop {
            attempt += 1;
            match self.attempt_once().await {
                Ok(measurement) => {
                    metrics::counter!("sensorlink_fetch_attempts_total", "call_site" => site, "result" => "ok")
                        .increment(1);
                    return Ok(Fetched {
                        outcome: FetchOutcome::Success(measurement),
                        attempts: attempt,
                    });
                }
                Err(AttemptFailure::Fatal(err)) => {
                    metrics::counter!("sensorlink_fetch_attempts_total", "call_site" => site, "result" => "decode_error")
                        .increment(1);
                    warn!(attempt, error = %err, "producer returned a malformed measurement");
                    return Err(FetchError::Decode(err));
                }
                Err(AttemptFailure::Retryable(err)) => {
                    metrics::counter!("sensorlink_fetch_attempts_total", "call_site" => site, "result" => "error")
                        .increment(1);
                    warn!(attempt, max_attempts, error = %err, "fetch attempt failed");
                    if attempt >= max_attempts {
                        break err;
                    }
                    if !self.policy.backoff.is_zero() {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        };

        match &self.policy.fallback {
            Some(fallback) => {
                metrics::counter!("sensorlink_fetch_fallbacks_total", "call_site" => site)
                    .increment(1);
                warn!(attempts = attempt, error = %last, "retries exhausted, using fallback measurement");
                Ok(Fetched {
                    outcome: FetchOutcome::FallbackUsed(fallback.produce(self.clock.as_ref())),
                    attempts: attempt,
                })
            }
            None => Err(FetchError::RemoteUnavailable {
                attempts: attempt,
                last,
            }),
        }
    }

    async fn attempt_once(&self) -> Result<Measurement, AttemptFailure> {
        let call = self.source.fetch_latest(self.call_site.producer_path());

        let result = match self.policy.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let timeout_ms = timeout.as_millis() as u64;
                    return Err(AttemptFailure::Retryable(AttemptError::RemoteTimeout {
                        timeout_ms,
                    }));
                }
            },
            None => call.await,
        };

        result.map_err(|err| match err {
            SourceError::Decode(err) => AttemptFailure::Fatal(err),
            SourceError::Transport(msg) => AttemptFailure::Retryable(AttemptError::RemoteFailure(msg)),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sensorlink_core::ManualClock;

    use super::*;
    use crate::fetch::Fallback;
    use crate::test_support::{reading, ScriptedSource, Step};

    fn client(source: &Arc<ScriptedSource>, site: CallSite, policy: FetchPolicy) -> ResilientFetchClient {
        ResilientFetchClient::new(
            Arc::clone(source) as Arc<dyn MeasurementSource>,
            site,
            policy,
            Arc::new(ManualClock::new(42_000)),
        )
    }

    fn retrying(max_retries: u32) -> FetchPolicy {
        FetchPolicy::default().with_retries(max_retries, Duration::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_consumes_no_retries() {
        let source = Arc::new(ScriptedSource::always(Step::Reply(reading(0.3))));
        let fetched = client(&source, CallSite::Sensor, retrying(10))
            .fetch_detailed()
            .await
            .unwrap();

        assert_eq!(fetched.outcome, FetchOutcome::Success(reading(0.3)));
        assert_eq!(fetched.attempts, 1);
        assert_eq!(fetched.retries(), 0);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_uses_third_attempt() {
        let source = Arc::new(ScriptedSource::new(
            vec![Step::Fail, Step::Fail],
            Step::Reply(reading(0.7)),
        ));
        let fetched = client(&source, CallSite::Sensor, retrying(10))
            .fetch_detailed()
            .await
            .unwrap();

        assert_eq!(fetched.into_measurement(), reading(0.7));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure_and_is_retried() {
        let source = Arc::new(ScriptedSource::new(
            vec![Step::Hang],
            Step::Reply(reading(0.1)),
        ));
        let fetched = client(&source, CallSite::Sensor, retrying(10))
            .fetch_detailed()
            .await
            .unwrap();

        assert_eq!(fetched.retries(), 1);
        assert!(!fetched.fallback_used());
    }

    #[tokio::test(start_paused = true)]
    async fn always_timing_out_with_fallback_returns_default_after_one_attempt() {
        let source = Arc::new(ScriptedSource::always(Step::Hang));
        let policy = FetchPolicy::default()
            .with_timeout(Duration::from_millis(500))
            .with_fallback(Fallback::Synthesized);

        let started = tokio::time::Instant::now();
        let fetched = client(&source, CallSite::Fallback, policy)
            .fetch_detailed()
            .await
            .unwrap();

        assert!(fetched.fallback_used());
        assert_eq!(fetched.attempts, 1);
        assert_eq!(source.calls(), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(500));

        // The fallback follows the synthesized construction rule.
        let m = fetched.into_measurement();
        assert_eq!(m.timestamp_millis(), 42_000);
        assert!((0.0..1.0).contains(&m.value()));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_applies_only_after_retries_run_out() {
        let source = Arc::new(ScriptedSource::always(Step::Hang));
        let policy = FetchPolicy::default()
            .with_timeout(Duration::from_millis(500))
            .with_retries(3, Duration::ZERO)
            .with_fallback(Fallback::Synthesized);

        let started = tokio::time::Instant::now();
        let fetched = client(&source, CallSite::Sensor, policy)
            .fetch_detailed()
            .await
            .unwrap();

        assert!(fetched.fallback_used());
        assert_eq!(fetched.attempts, 4);
        assert_eq!(fetched.retries(), 3);
        assert_eq!(source.calls(), 4);
        // Four full timeouts before the fallback is produced.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_have_independent_budgets() {
        let source = Arc::new(ScriptedSource::always(Step::Hang));
        let client = client(&source, CallSite::Slow, FetchPolicy::default());

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(client.fetch(), client.fetch());

        // Both timed out side by side, not one after the other.
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(source.calls(), 2);
        for result in [a, b] {
            assert!(matches!(
                result,
                Err(FetchError::RemoteUnavailable {
                    attempts: 1,
                    last: AttemptError::RemoteTimeout { timeout_ms: 500 },
                })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_retry_counts_do_not_leak_between_fetches() {
        // Two scripted failures shared between two fetches: each fetch stops
        // at its own first reply, however the calls interleave.
        let source = Arc::new(ScriptedSource::new(
            vec![Step::Fail, Step::Reply(reading(0.8)), Step::Fail],
            Step::Reply(reading(0.2)),
        ));
        let client = client(&source, CallSite::Sensor, retrying(10));

        let (a, b) = tokio::join!(client.fetch_detailed(), client.fetch_detailed());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(source.calls(), 4);
        assert_eq!(a.attempts + b.attempts, 4);
        assert!(a.attempts <= 3 && b.attempts <= 3);
        assert!(!a.fallback_used() && !b.fallback_used());
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_without_fallback_is_unavailable_after_eleven_attempts() {
        let source = Arc::new(ScriptedSource::always(Step::Fail));
        let err = client(&source, CallSite::Sensor, retrying(10))
            .fetch()
            .await
            .unwrap_err();

        assert_eq!(source.calls(), 11);
        match err {
            FetchError::RemoteUnavailable { attempts, last } => {
                assert_eq!(attempts, 11);
                assert_eq!(last, AttemptError::RemoteFailure("connection refused".into()));
            }
            other => panic!("expected RemoteUnavailable, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_only_policy_gives_up_after_single_attempt() {
        let source = Arc::new(ScriptedSource::always(Step::Hang));
        let err = client(&source, CallSite::Slow, FetchPolicy::default())
            .fetch()
            .await
            .unwrap_err();

        assert_eq!(source.calls(), 1);
        assert!(matches!(
            err,
            FetchError::RemoteUnavailable {
                attempts: 1,
                last: AttemptError::RemoteTimeout { timeout_ms: 500 },
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_not_retried() {
        let source = Arc::new(ScriptedSource::new(
            vec![Step::Fail, Step::Malformed],
            Step::Reply(reading(0.2)),
        ));
        let policy = retrying(10).with_fallback(Fallback::Synthesized);
        let err = client(&source, CallSite::Sensor, policy).fetch().await.unwrap_err();

        assert!(matches!(err, FetchError::Decode(_)));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_spaces_attempts_without_changing_the_ceiling() {
        let source = Arc::new(ScriptedSource::always(Step::Fail));
        let policy = FetchPolicy::default().with_retries(3, Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let err = client(&source, CallSite::Sensor, policy).fetch().await.unwrap_err();

        assert!(matches!(err, FetchError::RemoteUnavailable { attempts: 4, .. }));
        assert_eq!(source.calls(), 4);
        // Three pauses between four attempts, none after the last.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn without_timeout_a_slow_reply_still_succeeds() {
        struct Delayed;

        #[async_trait::async_trait]
        impl MeasurementSource for Delayed {
            async fn fetch_latest(&self, _path: &str) -> Result<Measurement, SourceError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(reading(0.9))
            }
        }

        let client = ResilientFetchClient::new(
            Arc::new(Delayed),
            CallSite::Slow,
            FetchPolicy::default().without_timeout(),
            Arc::new(ManualClock::new(0)),
        );
        assert_eq!(client.fetch().await.unwrap(), reading(0.9));
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_from_the_call_site_path() {
        let source = Arc::new(ScriptedSource::always(Step::Reply(reading(0.5))));
        let config = FetchConfig::default();
        let clock: Arc<dyn ClockSource> = Arc::new(ManualClock::new(0));

        for site in CallSite::ALL {
            let client = ResilientFetchClient::for_call_site(
                Arc::clone(&source) as Arc<dyn MeasurementSource>,
                site,
                &config,
                Arc::clone(&clock),
            );
            assert_eq!(client.policy(), &site.policy(&config));
            client.fetch().await.unwrap();
        }

        assert_eq!(source.paths(), vec!["/data", "/data/slow", "/data/slow"]);
    }
}
