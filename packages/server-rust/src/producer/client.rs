//! HTTP access to a remote producer.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use sensorlink_core::{Measurement, MeasurementSource, SourceError};
use tracing::debug;

/// [`MeasurementSource`] that issues `GET {base_url}{path}` with `reqwest`.
///
/// Carries no timeout of its own; the fetch client bounds each attempt and
/// drops the request future when the budget runs out.
#[derive(Debug, Clone)]
pub struct HttpProducerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProducerClient {
    /// A trailing `/` on `base_url` is ignored.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl MeasurementSource for HttpProducerClient {
    async fn fetch_latest(&self, path: &str) -> Result<Measurement, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "requesting measurement");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!("{url} returned {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(Measurement::decode(&body)?)
    }
}
