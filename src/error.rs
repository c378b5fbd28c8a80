//! Error taxonomy for the monitor.
//!
//! Fetch errors never reach the user: the fetch client logs them and hands an
//! empty reading set to the data store. Export errors are shown as a notice.

use std::path::PathBuf;

// ---

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    // ---
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no data for unit")]
    NoData,
}

impl FetchError {
    // ---
    /// Network-side failure as opposed to an answered "nothing here".
    pub fn is_network_failure(&self) -> bool {
        !matches!(self, FetchError::NoData)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    // ---
    #[error("No data available to export")]
    NoData,

    #[error("no report renderer configured")]
    NoRenderer,

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}
