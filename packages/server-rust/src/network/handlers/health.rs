//! Health, liveness, and readiness endpoint handlers.
//!
//! Liveness reflects fetch recency from the [`HealthTracker`](crate::health::HealthTracker);
//! readiness reflects the service lifecycle. Orchestrators restart on the
//! former and stop routing on the latter.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::network::LifecycleState;

/// Name of the recency check in the liveness report.
pub const LAST_MESSAGE_CHECK: &str = "Last message check";

/// Returns lifecycle and recency details as JSON.
///
/// Always 200; the body carries the verdicts.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let now = state.clock.now();
    let liveness = state
        .health
        .status(now, state.health_config.staleness_threshold_ms);

    Json(json!({
        "state": state.shutdown.state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "liveness": liveness,
    }))
}

/// Liveness probe: 200 while the last fetch is recent enough, 503 once stale.
///
/// The body follows the health-check report shape:
///
/// ```json
/// {"status": "UP", "checks": [{"name": "Last message check", "status": "UP",
///   "data": {"lastSuccessTime": 1714564800000, "ageMs": 1200}}]}
/// ```
///
/// `data` is omitted until the first fetch.
pub async fn liveness_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let now = state.clock.now();
    let status = state
        .health
        .status(now, state.health_config.staleness_threshold_ms);
    let verdict = if status.healthy { "UP" } else { "DOWN" };

    let mut check = json!({
        "name": LAST_MESSAGE_CHECK,
        "status": verdict,
    });
    if let (Some(last), Some(age)) = (status.last_success_time, status.age_ms) {
        check["data"] = json!({
            "lastSuccessTime": last,
            "ageMs": age,
        });
    }

    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(json!({ "status": verdict, "checks": [check] })))
}

/// Readiness probe: 200 only while the lifecycle is `Ready`.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.state() == LifecycleState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
