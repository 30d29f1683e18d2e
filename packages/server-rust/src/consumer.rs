//! The consumer's externally visible "give me current data" operation.
//!
//! Per request: fetch through the [`ResilientFetchClient`], then record the
//! completed cycle in the [`HealthTracker`]. A real measurement and a
//! fallback substitute both count as completed; a surfaced
//! [`FetchError`] propagates without touching health state.

use std::sync::Arc;

use sensorlink_core::{ClockSource, Measurement, MeasurementSource};
use tracing::{debug, info, warn};

use crate::fetch::{CallSite, FetchConfig, FetchError, ResilientFetchClient};
use crate::health::HealthTracker;

/// Ties one fetch client to the shared health tracker.
pub struct ConsumerEndpoint {
    client: ResilientFetchClient,
    health: Arc<HealthTracker>,
    clock: Arc<dyn ClockSource>,
}

impl ConsumerEndpoint {
    #[must_use]
    pub fn new(
        client: ResilientFetchClient,
        health: Arc<HealthTracker>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            client,
            health,
            clock,
        }
    }

    #[must_use]
    pub fn call_site(&self) -> CallSite {
        self.client.call_site()
    }

    /// Fetches the current measurement and registers the completed cycle.
    ///
    /// # Errors
    ///
    /// Propagates any [`FetchError`] from the client. Health state is left
    /// untouched in that case.
    pub async fn get_data(&self) -> Result<Measurement, FetchError> {
        let site = self.call_site().as_str();
        info!(call_site = site, "collecting data from producer");

        let fetched = match self.client.fetch_detailed().await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(call_site = site, error = %err, "fetch failed, health not updated");
                return Err(err);
            }
        };

        let now = self.clock.now();
        self.health.register_fetch(now);
        debug!(
            call_site = site,
            attempts = fetched.attempts,
            fallback = fetched.fallback_used(),
            registered_at = now,
            "fetch cycle registered"
        );

        Ok(fetched.into_measurement())
    }
}

/// One [`ConsumerEndpoint`] per [`CallSite`], all sharing a health tracker.
pub struct Consumers {
    sensor: ConsumerEndpoint,
    slow: ConsumerEndpoint,
    fallback: ConsumerEndpoint,
}

impl Consumers {
    /// Builds the endpoints with each call site's preset policy.
    #[must_use]
    pub fn build(
        source: &Arc<dyn MeasurementSource>,
        config: &FetchConfig,
        health: &Arc<HealthTracker>,
        clock: &Arc<dyn ClockSource>,
    ) -> Self {
        let endpoint = |site: CallSite| {
            ConsumerEndpoint::new(
                ResilientFetchClient::for_call_site(
                    Arc::clone(source),
                    site,
                    config,
                    Arc::clone(clock),
                ),
                Arc::clone(health),
                Arc::clone(clock),
            )
        };

        Self {
            sensor: endpoint(CallSite::Sensor),
            slow: endpoint(CallSite::Slow),
            fallback: endpoint(CallSite::Fallback),
        }
    }

    #[must_use]
    pub fn get(&self, site: CallSite) -> &ConsumerEndpoint {
        match site {
            CallSite::Sensor => &self.sensor,
            CallSite::Slow => &self.slow,
            CallSite::Fallback => &self.fallback,
        }
    }
}
