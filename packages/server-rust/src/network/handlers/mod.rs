//! Consumer HTTP handlers and the state they share.

pub mod data;
pub mod health;

pub use data::{data_handler, fallback_data_handler, slow_data_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use sensorlink_core::ClockSource;

use super::ShutdownController;
use crate::consumer::Consumers;
use crate::health::{HealthConfig, HealthTracker};

/// Shared application state passed to all consumer handlers via `State`.
///
/// Holds `Arc` references so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// One consumer endpoint per call site.
    pub consumers: Arc<Consumers>,
    /// The tracker the consumers register completed fetches in.
    pub health: Arc<HealthTracker>,
    pub health_config: HealthConfig,
    pub clock: Arc<dyn ClockSource>,
    /// Lifecycle state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, used for uptime.
    pub start_time: Instant,
}

/// Assembles the consumer's routes.
///
/// Routes:
/// - `GET /data` -- retrying fetch
/// - `GET /data/slow` -- timeout-only fetch
/// - `GET /data/fallback` -- timeout + fallback fetch
/// - `GET /health` -- lifecycle and recency details
/// - `GET /health/live` -- recency-based liveness probe
/// - `GET /health/ready` -- lifecycle-based readiness probe
pub fn consumer_router(state: AppState) -> Router {
    Router::new()
        .route("/data", get(data_handler))
        .route("/data/slow", get(slow_data_handler))
        .route("/data/fallback", get(fallback_data_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}
