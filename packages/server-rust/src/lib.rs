//! Sensorlink Server — resilient measurement consumer, recency-based health,
//! and a sample producer.

pub mod consumer;
pub mod fetch;
pub mod health;
pub mod network;
pub mod producer;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use consumer::{ConsumerEndpoint, Consumers};
pub use fetch::{CallSite, Fallback, FetchConfig, FetchError, FetchPolicy, ResilientFetchClient};
pub use health::{HealthConfig, HealthStatus, HealthTracker};
pub use network::{AppState, NetworkConfig, NetworkModule};
pub use producer::{HttpProducerClient, ProducerConfig, ProducerState};
