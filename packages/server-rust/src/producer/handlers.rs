//! Producer endpoint handlers.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use sensorlink_core::Measurement;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::ProducerState;

/// Returns a fresh measurement, or fails with 500 at the configured rate.
pub async fn data_handler(
    State(state): State<ProducerState>,
) -> Result<Json<Measurement>, StatusCode> {
    info!("measurement requested");
    if rand::random::<f64>() < state.config.failure_rate {
        error!("simulated producer failure");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(Measurement::synthesize(state.clock.as_ref())))
}

/// Returns a fresh measurement after a random delay.
pub async fn slow_data_handler(State(state): State<ProducerState>) -> Json<Measurement> {
    let max = state.config.max_slow_delay_ms;
    let delay_ms = if max == 0 { 0 } else { rand::random_range(0..max) };
    info!(delay_ms, "slow measurement requested");
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    Json(Measurement::synthesize(state.clock.as_ref()))
}

/// Streams ticked measurements as server-sent events, starting with one
/// emitted on connect.
pub async fn stream_handler(
    State(state): State<ProducerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("stream subscriber connected");
    let feed = state.feed.subscribe();
    let stop = state.shutdown.shutdown_receiver();
    // Subscribed first, so the requested emit reaches this stream.
    state.request_emit();
    let events = measurement_stream(feed, stop).filter_map(|m| async move {
        match Event::default().json_data(&m) {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                warn!(error = %err, "dropping unencodable measurement");
                None
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Turns a broadcast subscription into a stream of measurements.
///
/// A subscriber that falls behind skips the measurements it missed and
/// continues with the oldest one still buffered. The stream ends when the
/// feed is dropped or `stop` flips to `true`.
pub fn measurement_stream(
    feed: broadcast::Receiver<Measurement>,
    stop: watch::Receiver<bool>,
) -> impl Stream<Item = Measurement> + Send {
    stream::unfold((feed, stop), |(mut feed, mut stop)| async move {
        loop {
            if *stop.borrow() {
                return None;
            }
            tokio::select! {
                received = feed.recv() => match received {
                    Ok(m) => return Some((m, (feed, stop))),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "stream subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
                changed = stop.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    })
}

/// Process liveness: the producer keeps no health state of its own.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}
