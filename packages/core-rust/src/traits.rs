//! The remote producer contract consumed by the fetch client.

use async_trait::async_trait;

use crate::measurement::{DecodeError, Measurement};

/// Errors a single producer call can surface.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The producer answered, but the payload is not a measurement.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Transport-level or remote-side failure (connection refused, 5xx, ...).
    #[error("remote failure: {0}")]
    Transport(String),
}

/// A remote producer of measurements.
///
/// One call is one request/response exchange. Implementations may block
/// indefinitely; bounding the wait is the caller's job, and dropping the
/// returned future must abandon the in-flight exchange.
/// Implementations: HTTP (`reqwest`), scripted doubles (tests).
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Fetch the latest measurement from the producer path `path`
    /// (for example `/data` or `/data/slow`).
    async fn fetch_latest(&self, path: &str) -> Result<Measurement, SourceError>;
}
