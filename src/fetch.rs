//! HTTP client for the readings endpoint.
//!
//! One request per refresh, no retries. Every failure mode collapses to an
//! empty reading set for the caller; the distinction survives only in the logs
//! and in the [`FetchStatus`] reported alongside the data.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{error::FetchError, models::ApiEnvelope, Reading, Window};

// ---

/// How the last fetch ended, for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum FetchStatus {
    Loaded(usize),
    NoData,
    Failed,
}

/// Result of one fetch: the readings (possibly empty) plus how it went.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub readings: Vec<Reading>,
    pub status: FetchStatus,
}

impl FetchResult {
    // ---
    pub fn from_outcome(outcome: Result<Vec<Reading>, FetchError>) -> Self {
        match outcome {
            Ok(readings) => Self {
                status: FetchStatus::Loaded(readings.len()),
                readings,
            },
            Err(e) => Self {
                readings: Vec::new(),
                status: if e.is_network_failure() {
                    FetchStatus::Failed
                } else {
                    FetchStatus::NoData
                },
            },
        }
    }
}

/// Source of readings for a unit and window.
#[async_trait]
pub trait ReadingsSource: Send + Sync {
    async fn fetch(&self, unit_id: &str, window: Window) -> FetchResult;
}

/// [`ReadingsSource`] backed by the REST API.
#[derive(Debug, Clone)]
pub struct HttpReadingsClient {
    // ---
    client: reqwest::Client,
    base_url: String,
    resource: String,
}

impl HttpReadingsClient {
    // ---
    pub fn new(base_url: &str, resource: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            resource: resource.trim_matches('/').to_string(),
        }
    }

    pub fn readings_url(&self, unit_id: &str, window: Window) -> String {
        format!(
            "{}/{}/monitoring/{}?period={}",
            self.base_url, self.resource, unit_id, window
        )
    }

    /// Fetch and decode, keeping the reason for an empty result.
    pub async fn try_fetch(
        &self,
        unit_id: &str,
        window: Window,
    ) -> Result<Vec<Reading>, FetchError> {
        // ---
        let url = self.readings_url(unit_id, window);
        debug!("Fetching readings from: {}", url);

        let response = self.client.get(&url).send().await?;
        let code = response.status();
        debug!("Response status: {}", code);

        if !code.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                code: code.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let envelope: ApiEnvelope = serde_json::from_str(&body)?;

        if !envelope.is_success() {
            debug!("Upstream status '{}' for unit {}", envelope.status, unit_id);
            return Err(FetchError::NoData);
        }

        let items = envelope.data.unwrap_or_default();
        let readings = decode_items(&items);

        if readings.is_empty() {
            return Err(FetchError::NoData);
        }

        Ok(readings)
    }
}

#[async_trait]
impl ReadingsSource for HttpReadingsClient {
    async fn fetch(&self, unit_id: &str, window: Window) -> FetchResult {
        // ---
        let outcome = self.try_fetch(unit_id, window).await;

        match &outcome {
            Ok(readings) => info!(
                "Loaded {} readings for unit {} ({})",
                readings.len(),
                unit_id,
                window
            ),
            Err(FetchError::NoData) => warn!("No readings found for unit {} ({})", unit_id, window),
            Err(e) => error!("Failed to fetch readings for unit {}: {}", unit_id, e),
        }

        FetchResult::from_outcome(outcome)
    }
}

/// Decode each array item on its own so one bad row does not drop the page.
fn decode_items(items: &[serde_json::Value]) -> Vec<Reading> {
    // ---
    let mut readings = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        match serde_json::from_value::<Reading>(item.clone()) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                debug!("Failed to parse item {}: {} - Raw item: {}", i, e, item);
            }
        }
    }

    if readings.len() < items.len() {
        warn!(
            "Skipped {} of {} malformed readings",
            items.len() - readings.len(),
            items.len()
        );
    }

    readings
}
