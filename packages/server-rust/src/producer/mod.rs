//! The sample producer service and the HTTP client that consumes it.
//!
//! - [`handlers`]: `/data` (randomly failing), `/data/slow` (randomly
//!   delayed), `/data/stream` (server-sent events)
//! - [`ticker`]: timer-driven producer feeding the stream
//! - [`client`]: `reqwest`-backed [`MeasurementSource`](sensorlink_core::MeasurementSource)

pub mod client;
pub mod handlers;
pub mod ticker;

pub use client::HttpProducerClient;
pub use ticker::{ProducerTask, TickingProducer};

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use sensorlink_core::{ClockSource, Measurement};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::network::ShutdownController;
use handlers::{data_handler, liveness_handler, slow_data_handler, stream_handler};

/// Producer behavior settings.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Probability in `[0, 1]` that `GET /data` fails with a 500.
    pub failure_rate: f64,
    /// Upper bound (exclusive) of the random delay on `GET /data/slow`.
    pub max_slow_delay_ms: u64,
    /// Interval between measurements on the stream.
    pub tick_interval: Duration,
    /// Buffered measurements per stream subscriber before it lags.
    pub stream_capacity: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.5,
            max_slow_delay_ms: 1_000,
            tick_interval: Duration::from_secs(2),
            stream_capacity: 16,
        }
    }
}

/// Shared state for producer handlers.
#[derive(Clone)]
pub struct ProducerState {
    pub config: Arc<ProducerConfig>,
    pub clock: Arc<dyn ClockSource>,
    /// Fan-out of ticked measurements to stream subscribers.
    pub feed: broadcast::Sender<Measurement>,
    /// Ends open streams when the service shuts down.
    pub shutdown: Arc<ShutdownController>,
    /// On-demand emits into `feed`, when a ticking producer is running.
    emitter: Option<mpsc::Sender<ProducerTask>>,
}

impl ProducerState {
    #[must_use]
    pub fn new(
        config: ProducerConfig,
        clock: Arc<dyn ClockSource>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        let (feed, _rx) = broadcast::channel(config.stream_capacity.max(1));
        Self {
            config: Arc::new(config),
            clock,
            feed,
            shutdown,
            emitter: None,
        }
    }

    /// Routes on-demand emit requests to the ticking producer behind `tasks`.
    #[must_use]
    pub fn with_emitter(mut self, tasks: mpsc::Sender<ProducerTask>) -> Self {
        self.emitter = Some(tasks);
        self
    }

    /// Asks the ticking producer to emit outside its schedule.
    ///
    /// Never waits: a full task queue already holds a pending emit.
    pub fn request_emit(&self) {
        if let Some(tasks) = &self.emitter {
            if tasks.try_send(ProducerTask::EmitNow).is_err() {
                debug!("emit request dropped");
            }
        }
    }
}

/// Assembles the producer's routes.
///
/// Routes:
/// - `GET /data` -- fresh measurement, fails with `failure_rate`
/// - `GET /data/slow` -- fresh measurement after a random delay
/// - `GET /data/stream` -- SSE stream of ticked measurements
/// - `GET /health/live` -- process liveness
pub fn router(state: ProducerState) -> Router {
    Router::new()
        .route("/data", get(data_handler))
        .route("/data/slow", get(slow_data_handler))
        .route("/data/stream", get(stream_handler))
        .route("/health/live", get(liveness_handler))
        .with_state(state)
}
