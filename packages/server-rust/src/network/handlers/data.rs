//! Data endpoints: one per consumer call site.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sensorlink_core::Measurement;
use serde_json::json;

use super::AppState;
use crate::fetch::{CallSite, FetchError};

/// `GET /data`: retries the flaky producer endpoint.
pub async fn data_handler(
    State(state): State<AppState>,
) -> Result<Json<Measurement>, FetchError> {
    get_data(&state, CallSite::Sensor).await
}

/// `GET /data/slow`: single attempt under the timeout.
pub async fn slow_data_handler(
    State(state): State<AppState>,
) -> Result<Json<Measurement>, FetchError> {
    get_data(&state, CallSite::Slow).await
}

/// `GET /data/fallback`: single attempt, substituting a synthesized
/// measurement on failure.
pub async fn fallback_data_handler(
    State(state): State<AppState>,
) -> Result<Json<Measurement>, FetchError> {
    get_data(&state, CallSite::Fallback).await
}

async fn get_data(state: &AppState, site: CallSite) -> Result<Json<Measurement>, FetchError> {
    state.consumers.get(site).get_data().await.map(Json)
}

/// Unavailable producers map to 503, malformed payloads to 502.
impl IntoResponse for FetchError {
    fn into_response(self) -> Response {
        let status = match &self {
            FetchError::Decode(_) => StatusCode::BAD_GATEWAY,
            FetchError::RemoteUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sensorlink_core::ManualClock;

    use super::*;
    use crate::network::handlers::test_state::app_state;
    use crate::test_support::{reading, ScriptedSource, Step};

    #[tokio::test(start_paused = true)]
    async fn data_handler_returns_measurement_and_registers_fetch() {
        let clock = Arc::new(ManualClock::new(9_000));
        let state = app_state(
            ScriptedSource::new(vec![Step::Fail, Step::Fail], Step::Reply(reading(0.8))),
            &clock,
        );

        let Json(m) = data_handler(State(state.clone())).await.unwrap();
        assert_eq!(m, reading(0.8));
        assert_eq!(state.health.last_success_time(), Some(9_000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_data_handler_maps_to_503_without_health_update() {
        let clock = Arc::new(ManualClock::new(9_000));
        let state = app_state(ScriptedSource::always(Step::Fail), &clock);

        let err = data_handler(State(state.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.health.last_success_time(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_surfaces_timeout() {
        let clock = Arc::new(ManualClock::new(0));
        let state = app_state(ScriptedSource::always(Step::Hang), &clock);

        let err = slow_data_handler(State(state)).await.unwrap_err();
        assert!(matches!(err, FetchError::RemoteUnavailable { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_handler_substitutes_and_registers() {
        let clock = Arc::new(ManualClock::new(4_000));
        let state = app_state(ScriptedSource::always(Step::Hang), &clock);

        let Json(m) = fallback_data_handler(State(state.clone())).await.unwrap();
        assert_eq!(m.timestamp_millis(), 4_000);
        assert_eq!(state.health.last_success_time(), Some(4_000));
    }

    #[tokio::test]
    async fn malformed_payload_maps_to_502() {
        let clock = Arc::new(ManualClock::new(0));
        let state = app_state(ScriptedSource::always(Step::Malformed), &clock);

        let err = fallback_data_handler(State(state)).await.unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "decode_error");
    }
}
