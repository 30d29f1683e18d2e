//! Resilient retrieval of measurements from a remote producer.
//!
//! A fetch is one logical "get the latest measurement" call wrapped in three
//! independently toggleable behaviors, applied in order:
//!
//! 1. **Timeout** (`policy`): bounds each attempt; an expired attempt counts as a failure
//! 2. **Retry** (`policy`): re-attempts failures up to `max_retries` times
//! 3. **Fallback** (`policy`): substitutes a synthesized measurement once retries run out
//!
//! The retry loop itself lives in [`client`].

pub mod client;
pub mod error;
pub mod policy;

pub use client::{FetchOutcome, Fetched, ResilientFetchClient};
pub use error::{AttemptError, FetchError};
pub use policy::{CallSite, Fallback, FetchConfig, FetchPolicy};
