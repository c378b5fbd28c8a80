//! Data models for soil sensor readings and the upstream API envelope.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

// ---

/// Status assigned upstream to each reading. Never recomputed locally.
///
/// Any value other than `ideal` or `atencao` is treated as critical, so a
/// reading with an unfamiliar status still counts as an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ReadingStatus {
    #[serde(rename = "ideal")]
    Ideal,
    #[serde(rename = "atencao")]
    Attention,
    #[serde(rename = "critico")]
    Critical,
}

impl From<String> for ReadingStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ideal" => ReadingStatus::Ideal,
            "atencao" | "attention" => ReadingStatus::Attention,
            _ => ReadingStatus::Critical,
        }
    }
}

impl ReadingStatus {
    // ---
    pub fn is_ideal(self) -> bool {
        matches!(self, ReadingStatus::Ideal)
    }

    /// Short code used in exported reports.
    pub fn code(self) -> &'static str {
        match self {
            ReadingStatus::Ideal => "OK",
            ReadingStatus::Attention => "AT",
            ReadingStatus::Critical => "CR",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReadingStatus::Ideal => "Ideal",
            ReadingStatus::Attention => "Attention",
            ReadingStatus::Critical => "Critical",
        }
    }
}

/// One hourly soil sensor sample, as served by the readings endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    /// Hour-granularity display label.
    #[serde(rename = "hora")]
    pub timestamp: String,
    pub ph: f64,
    #[serde(rename = "umidade")]
    pub humidity: f64,
    #[serde(rename = "temp")]
    pub temperature: f64,
    #[serde(rename = "salinidade")]
    pub salinity: f64,
    #[serde(rename = "condutividade")]
    pub conductivity: f64,
    #[serde(rename = "n")]
    pub nitrogen: f64,
    #[serde(rename = "p")]
    pub phosphorus: f64,
    #[serde(rename = "k")]
    pub potassium: f64,
    #[serde(rename = "drenagem", default)]
    pub drainage: Option<f64>,
    #[serde(rename = "aeracao", default)]
    pub aeration: Option<f64>,
    #[serde(rename = "compactacao", default)]
    pub compaction: Option<f64>,
    #[serde(rename = "atividadeMicrobiana", default)]
    pub microbial_activity: Option<f64>,
    pub status: ReadingStatus,
}

/// Server-side time range filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    Last6Hours,
    #[default]
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
}

impl Window {
    // ---
    pub const ALL: [Window; 4] = [
        Window::LastHour,
        Window::Last6Hours,
        Window::Last24Hours,
        Window::Last7Days,
    ];

    /// Value sent as the `period` query parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            Window::LastHour => "1h",
            Window::Last6Hours => "6h",
            Window::Last24Hours => "24h",
            Window::Last7Days => "7d",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Window::LastHour => "Last hour",
            Window::Last6Hours => "Last 6 hours",
            Window::Last24Hours => "Last 24 hours",
            Window::Last7Days => "Last 7 days",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown window '{0}' (expected 1h, 6h, 24h or 7d)")]
pub struct ParseWindowError(pub String);

impl FromStr for Window {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        Window::ALL
            .into_iter()
            .find(|w| w.as_param() == s.trim())
            .ok_or_else(|| ParseWindowError(s.to_string()))
    }
}

/// Response body of `GET /{resource}/monitoring/{id}`.
///
/// `data` stays untyped so that a single malformed row does not discard the
/// whole page; rows are decoded one at a time by the fetch client.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    // ---
    pub status: String,
    #[serde(default)]
    pub data: Option<Vec<serde_json::Value>>,
}

impl ApiEnvelope {
    // ---
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
