//! Summary statistics over the current reading set.

use serde::Serialize;

use crate::models::Reading;

// ---

pub const NOT_AVAILABLE: &str = "N/A";

/// Derived metrics for one refresh. Recomputed every time, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    // ---
    /// Mean pH with exactly one decimal place.
    pub average_ph: String,
    /// Readings whose status is not `ideal`.
    pub alert_count: usize,
    /// Share of `ideal` readings, 0..=100.
    pub health_percent: u8,
    /// Timestamp label of the most recent reading.
    pub latest_timestamp: String,
    pub reading_count: usize,
}

impl MetricsSnapshot {
    // ---
    pub fn empty() -> Self {
        Self {
            average_ph: "0.0".to_string(),
            alert_count: 0,
            health_percent: 0,
            latest_timestamp: NOT_AVAILABLE.to_string(),
            reading_count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.reading_count > 0
    }

    pub fn alert_label(&self) -> &'static str {
        if !self.has_data() {
            "No data"
        } else if self.alert_count > 0 {
            "Attention"
        } else {
            "OK"
        }
    }

    pub fn health_label(&self) -> &'static str {
        if !self.has_data() {
            "No data"
        } else if self.health_percent > 70 {
            "Good"
        } else {
            "Fair"
        }
    }
}

/// Reduce a reading set (newest first) to its summary metrics.
pub fn aggregate(readings: &[Reading]) -> MetricsSnapshot {
    // ---
    let Some(latest) = readings.first() else {
        return MetricsSnapshot::empty();
    };

    let total = readings.len() as f64;
    let ph_sum: f64 = readings.iter().map(|r| r.ph).sum();
    let ideal = readings.iter().filter(|r| r.status.is_ideal()).count();

    let latest_timestamp = if latest.timestamp.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        latest.timestamp.clone()
    };

    MetricsSnapshot {
        average_ph: format_one_decimal(ph_sum / total),
        alert_count: readings.len() - ideal,
        health_percent: (ideal as f64 * 100.0 / total).round().clamp(0.0, 100.0) as u8,
        latest_timestamp,
        reading_count: readings.len(),
    }
}

/// One decimal place, rounding the exact binary value of `value`.
///
/// Only exact ties (odd multiples of 0.05 that a `f64` can hold, such as
/// 6.25) go away from zero. A mean stored as 6.0499999... stays "6.0".
pub fn format_one_decimal(value: f64) -> String {
    // ---
    // `{:.1}` rounds exact ties to even, so those are handled first.
    let quarters = value * 4.0;
    if quarters.fract() == 0.0 && quarters % 2.0 != 0.0 {
        return format!("{:.1}", (value * 10.0).round() / 10.0);
    }
    format!("{:.1}", value)
}
