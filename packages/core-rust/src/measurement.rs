//! The measurement exchanged between producer and consumer.
//!
//! # Wire format
//!
//! Measurements travel as JSON objects:
//!
//! ```json
//! {"id": 7, "data": 0.4213, "time": "2024-05-01T12:00:00.125Z"}
//! ```
//!
//! `id` is present only for persisted readings and is omitted otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::ClockSource;

/// Errors from decoding a measurement payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty measurement payload")]
    Empty,
    #[error("malformed measurement payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A single timestamped sensor reading.
///
/// Fields are private so a constructed measurement cannot be mutated; each
/// side of an exchange owns its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    data: f64,
    time: DateTime<Utc>,
}

impl Measurement {
    /// Creates a measurement with an explicit value and timestamp.
    #[must_use]
    pub fn new(data: f64, time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            data,
            time,
        }
    }

    /// Creates a measurement from a value and a millisecond epoch timestamp.
    #[must_use]
    pub fn at_millis(data: f64, millis: u64) -> Self {
        Self::new(data, millis_to_datetime(millis))
    }

    /// Synthesizes a reading with a uniformly random value in `[0, 1)`,
    /// stamped with the clock's current time.
    ///
    /// This is the construction rule for both sample producers and
    /// fallback values.
    #[must_use]
    pub fn synthesize(clock: &dyn ClockSource) -> Self {
        Self::at_millis(rand::random::<f64>(), clock.now())
    }

    /// Returns a copy carrying the given persistence identifier.
    #[must_use]
    pub fn with_id(self, id: i64) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// The reading itself.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.data
    }

    /// When the reading was taken.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.time
    }

    /// The timestamp as milliseconds since Unix epoch, clamped at 0.
    #[must_use]
    pub fn timestamp_millis(&self) -> u64 {
        u64::try_from(self.time.timestamp_millis()).unwrap_or(0)
    }

    /// Decodes a measurement from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Empty`] for an empty (or whitespace-only) body
    /// and [`DecodeError::Malformed`] when the JSON does not describe a
    /// measurement.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encodes the measurement into its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails. Non-finite `data` encodes as
    /// `null`, which [`Measurement::decode`] then rejects.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn millis_to_datetime(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}
