//! Report export.
//!
//! [`build_report`] turns the in-scope readings and their metrics into a
//! document model with every value already formatted for print (decimal
//! comma, status codes). A [`ReportRenderer`] then lays it out; the shipped
//! renderer writes the document as JSON, a PDF backend plugs in behind the
//! same trait.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::ExportError, metrics::MetricsSnapshot, Reading, Window};

// ---

pub const REPORT_TITLE: &str = "EKKO";
pub const REPORT_SUBTITLE: &str = "Agricultural Monitoring Report";
pub const REPORT_FOOTER: &str =
    "Generated by EKKO - Precision Agriculture | ETE FMC - Santa Rita do Sapucai, MG";

/// Printed in place of a missing compaction or microbial activity value.
pub const MISSING_VALUE_PLACEHOLDER: f64 = 50.0;

pub const TABLE_HEADERS: [&str; 10] = ["H", "pH", "U", "T", "Cp", "M", "N", "P", "K", "St"];

const PARAMETER_LEGEND: [&str; 3] = [
    "H = Hour - pH = Hydrogen potential - U = Humidity (%) - T = Temperature (C)",
    "Cp = Compaction (g/cm3) - M = Microbial activity (mg/kg)",
    "N = Nitrogen (mg/kg) - P = Phosphorus (mg/kg) - K = Potassium (mg/kg) - St = Status",
];

const STATUS_LEGEND: &str = "Status: OK = Ideal | AT = Attention | CR = Critical";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    // ---
    pub export_date: String,
    pub export_time: String,
    pub unit_id: String,
    pub window: String,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    // ---
    pub title: String,
    pub subtitle: String,
    pub metadata: ReportMetadata,
    pub summary: MetricsSnapshot,
    pub parameter_legend: Vec<String>,
    pub status_legend: String,
    pub headers: Vec<String>,
    pub rows: Vec<[String; 10]>,
    pub footer: String,
    /// `YYYYMMDD` stamp used in the file name.
    pub date_stamp: String,
}

impl Report {
    // ---
    pub fn file_name(&self, extension: &str) -> String {
        format!("SoilMonitoringReport_{}.{}", self.date_stamp, extension)
    }
}

/// Lays out a [`Report`] and stores it under `dir`.
pub trait ReportRenderer: Send + Sync {
    // ---
    fn render(&self, report: &Report, dir: &Path) -> Result<PathBuf, ExportError>;
}

/// Writes the report document as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportRenderer;

impl ReportRenderer for JsonReportRenderer {
    fn render(&self, report: &Report, dir: &Path) -> Result<PathBuf, ExportError> {
        // ---
        let path = dir.join(report.file_name("json"));
        let body = serde_json::to_vec_pretty(report)?;

        fs::write(&path, body).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

/// Build the report document. Rejected up front when there is nothing to export.
pub fn build_report(
    unit_id: &str,
    window: Window,
    readings: &[Reading],
    metrics: &MetricsSnapshot,
    now: DateTime<Utc>,
) -> Result<Report, ExportError> {
    // ---
    if readings.is_empty() {
        return Err(ExportError::NoData);
    }

    Ok(Report {
        title: REPORT_TITLE.to_string(),
        subtitle: REPORT_SUBTITLE.to_string(),
        metadata: ReportMetadata {
            export_date: now.format("%d/%m/%Y").to_string(),
            export_time: now.format("%H:%M:%S UTC").to_string(),
            unit_id: unit_id.to_string(),
            window: window.label().to_string(),
            record_count: readings.len(),
        },
        summary: metrics.clone(),
        parameter_legend: PARAMETER_LEGEND.iter().map(|s| s.to_string()).collect(),
        status_legend: STATUS_LEGEND.to_string(),
        headers: TABLE_HEADERS.iter().map(|s| s.to_string()).collect(),
        rows: readings.iter().map(report_row).collect(),
        footer: REPORT_FOOTER.to_string(),
        date_stamp: now.format("%Y%m%d").to_string(),
    })
}

/// Build and render in one step, returning the written path.
pub fn export_report(
    renderer: &dyn ReportRenderer,
    dir: &Path,
    unit_id: &str,
    window: Window,
    readings: &[Reading],
    metrics: &MetricsSnapshot,
    now: DateTime<Utc>,
) -> Result<PathBuf, ExportError> {
    // ---
    let report = build_report(unit_id, window, readings, metrics, now)?;
    let path = renderer.render(&report, dir)?;
    tracing::info!(
        "Exported {} readings for unit {} to {}",
        report.metadata.record_count,
        unit_id,
        path.display()
    );
    Ok(path)
}

fn report_row(r: &Reading) -> [String; 10] {
    // ---
    [
        r.timestamp.clone(),
        decimal_comma(r.ph),
        decimal_comma(r.humidity),
        decimal_comma(r.temperature),
        decimal_comma(or_placeholder(r.compaction)),
        decimal_comma(or_placeholder(r.microbial_activity)),
        decimal_comma(r.nitrogen),
        decimal_comma(r.phosphorus),
        decimal_comma(r.potassium),
        r.status.code().to_string(),
    ]
}

/// Shortest round-trip representation with a decimal comma.
pub fn decimal_comma(value: f64) -> String {
    value.to_string().replace('.', ",")
}

// Zero counts as missing, matching how the table renders it.
fn or_placeholder(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v != 0.0 => v,
        _ => MISSING_VALUE_PLACEHOLDER,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::metrics::aggregate;
    use crate::models::tests::sample_reading;
    use crate::models::ReadingStatus::{Attention, Critical, Ideal};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 7).unwrap()
    }

    #[test]
    fn test_rejects_empty_reading_set() {
        // ---
        let err =
            build_report("unit-1", Window::Last24Hours, &[], &aggregate(&[]), now()).unwrap_err();
        assert!(matches!(err, ExportError::NoData));
        assert_eq!(err.to_string(), "No data available to export");
    }

    #[test]
    fn test_empty_export_never_reaches_renderer() {
        // ---
        struct PanickingRenderer;
        impl ReportRenderer for PanickingRenderer {
            fn render(&self, _: &Report, _: &Path) -> Result<PathBuf, ExportError> {
                panic!("renderer must not be called");
            }
        }

        let result = export_report(
            &PanickingRenderer,
            Path::new("."),
            "unit-1",
            Window::LastHour,
            &[],
            &aggregate(&[]),
            now(),
        );
        assert!(matches!(result, Err(ExportError::NoData)));
    }

    #[test]
    fn test_rows_are_locale_formatted() {
        // ---
        let mut first = sample_reading("14:00", 6.5, Ideal);
        first.compaction = Some(1.35);
        let mut second = sample_reading("13:00", 7.0, Attention);
        second.microbial_activity = Some(0.0);
        let third = sample_reading("12:00", 5.8, Critical);
        let readings = vec![first, second, third];

        let metrics = aggregate(&readings);
        let report =
            build_report("unit-1", Window::Last6Hours, &readings, &metrics, now()).unwrap();

        assert_eq!(
            report.rows[0],
            ["14:00", "6,5", "45,5", "22", "1,35", "12,5", "40", "18,5", "150", "OK"]
                .map(String::from)
        );
        // Missing and zero values print the placeholder.
        assert_eq!(report.rows[1][4], "50");
        assert_eq!(report.rows[1][5], "50");
        assert_eq!(report.rows[1][9], "AT");
        assert_eq!(report.rows[2][9], "CR");

        // In-memory model is untouched.
        assert_eq!(readings[0].ph, 6.5);
    }

    #[test]
    fn test_metadata_and_summary() {
        // ---
        let readings = vec![
            sample_reading("14:00", 6.0, Ideal),
            sample_reading("13:00", 7.0, Attention),
        ];
        let metrics = aggregate(&readings);

        let report = build_report("unit-9", Window::Last7Days, &readings, &metrics, now()).unwrap();

        assert_eq!(report.metadata.export_date, "26/03/2025");
        assert_eq!(report.metadata.export_time, "18:45:07 UTC");
        assert_eq!(report.metadata.unit_id, "unit-9");
        assert_eq!(report.metadata.window, "Last 7 days");
        assert_eq!(report.metadata.record_count, 2);
        assert_eq!(report.summary, metrics);
        assert_eq!(report.headers.len(), report.rows[0].len());
        assert_eq!(report.file_name("pdf"), "SoilMonitoringReport_20250326.pdf");
    }

    #[test]
    fn test_json_renderer_writes_file() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let readings = vec![sample_reading("14:00", 6.4, Ideal)];

        let path = export_report(
            &JsonReportRenderer,
            dir.path(),
            "unit-1",
            Window::Last24Hours,
            &readings,
            &aggregate(&readings),
            now(),
        )
        .unwrap();

        assert_eq!(path, dir.path().join("SoilMonitoringReport_20250326.json"));

        let written: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["metadata"]["record_count"], 1);
        assert_eq!(written["rows"][0][1], "6,4");
        assert_eq!(written["summary"]["average_ph"], "6.4");
    }
}
