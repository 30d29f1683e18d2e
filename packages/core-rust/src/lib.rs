//! Sensorlink Core — measurement model, clock sources, and the producer contract.

pub mod clock;
pub mod measurement;
pub mod traits;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use measurement::{DecodeError, Measurement};
pub use traits::{MeasurementSource, SourceError};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
