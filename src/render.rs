//! Plain-text presentation of the dashboard.
//!
//! Every function here is a pure mapping from a [`DashboardSnapshot`] to
//! text. [`run_presenter`] subscribes to the monitor and prints a fresh
//! frame on every published change.

use std::fmt::Write as _;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    correlation::{CorrelationEngine, CorrelationPanel, MIN_READINGS},
    fetch::FetchStatus,
    metrics::MetricsSnapshot,
    monitor::DashboardSnapshot,
    Reading,
};

// ---

const NO_DATA_ROW: &str = "No data found - there are no soil readings for this period";

pub fn render_metric_cards(m: &MetricsSnapshot) -> String {
    // ---
    let has_data = m.has_data();
    let status = |ok: &'static str| if has_data { ok } else { "No data" };

    let mut out = String::new();
    let _ = writeln!(out, "[pH {}]  period average ({})", m.average_ph, status("calculated"));
    let _ = writeln!(out, "[{} alerts]  active ({})", m.alert_count, m.alert_label());
    let _ = writeln!(out, "[{}%]  soil health ({})", m.health_percent, m.health_label());
    let _ = writeln!(out, "[{}]  last reading ({})", m.latest_timestamp, status("available"));
    out
}

/// Table header line plus the capped preview (or every row when expanded).
pub fn render_table(snapshot: &DashboardSnapshot, preview_rows: usize) -> String {
    // ---
    let total = snapshot.readings.len();
    let mut out = String::new();

    let _ = writeln!(out, "Hourly readings - {}", snapshot.window.label());

    if snapshot.table_expanded {
        let _ = writeln!(out, "{total} records (expanded)");
        out.push_str(&render_expanded_table(&snapshot.readings));
        return out;
    }

    let shown = &snapshot.readings[..total.min(preview_rows)];
    let _ = writeln!(out, "{} of {} records", shown.len(), total);
    let _ = writeln!(
        out,
        "{:<6} {:>5} {:>7} {:>7} {:>9} {:>8} {:>8} {:>8} {:>8}  {}",
        "Hour",
        "pH",
        "Hum%",
        "Temp C",
        "Sal ppm",
        "EC dS/m",
        "N mg/kg",
        "P mg/kg",
        "K mg/kg",
        "Status",
    );

    if shown.is_empty() {
        let _ = writeln!(out, "{NO_DATA_ROW}");
        return out;
    }

    for r in shown {
        let _ = writeln!(
            out,
            "{:<6} {:>5} {:>7} {:>7} {:>9} {:>8} {:>8} {:>8} {:>8}  {}",
            r.timestamp,
            r.ph,
            r.humidity,
            r.temperature,
            r.salinity,
            r.conductivity,
            r.nitrogen,
            r.phosphorus,
            r.potassium,
            r.status.label()
        );
    }
    out
}

/// All fourteen columns, including the optional measurements.
pub fn render_expanded_table(readings: &[Reading]) -> String {
    // ---
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<6} {:>5} {:>6} {:>6} {:>7} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
        "Hour",
        "pH",
        "Hum",
        "Temp",
        "Sal",
        "EC",
        "Drain",
        "Aer",
        "Comp",
        "Micro",
        "N",
        "P",
        "K",
        "Status",
    );

    if readings.is_empty() {
        let _ = writeln!(out, "{NO_DATA_ROW}");
        return out;
    }

    for r in readings {
        let _ = writeln!(
            out,
            "{:<6} {:>5} {:>6} {:>6} {:>7} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
            r.timestamp,
            r.ph,
            r.humidity,
            r.temperature,
            r.salinity,
            r.conductivity,
            optional(r.drainage),
            optional(r.aeration),
            optional(r.compaction),
            optional(r.microbial_activity),
            r.nitrogen,
            r.phosphorus,
            r.potassium,
            r.status.label()
        );
    }
    out
}

/// Stats row plus the state-specific body of the correlation panel.
pub fn render_correlations(
    panel: Option<&CorrelationPanel>,
    engine: Option<&dyn CorrelationEngine>,
) -> String {
    // ---
    let Some(panel) = panel else {
        return "Correlations: pending\n".to_string();
    };

    let mut out = String::new();

    if let CorrelationPanel::EngineUnavailable = panel {
        let _ = writeln!(out, "Correlations: ERROR - engine not loaded");
        return out;
    }

    let s = panel.summary();
    let _ = writeln!(
        out,
        "Correlations: {} found | {} strong | {} positive | {} negative",
        s.total, s.strong, s.positive, s.negative
    );

    match panel {
        CorrelationPanel::InsufficientData { available } => {
            let _ = writeln!(
                out,
                "Insufficient data: {MIN_READINGS} records needed (current: {available})"
            );
        }
        CorrelationPanel::Computed { correlations, .. } if correlations.is_empty() => {
            let _ = writeln!(out, "No significant correlation in the current data");
        }
        CorrelationPanel::Computed { correlations, .. } => {
            if let Some(engine) = engine {
                let _ = writeln!(out, "{}", engine.describe(correlations));
            }
        }
        CorrelationPanel::Failed { message } => {
            let _ = writeln!(out, "Error computing correlations: {message}");
        }
        CorrelationPanel::EngineUnavailable => {}
    }
    out
}

pub fn render_dashboard(
    snapshot: &DashboardSnapshot,
    preview_rows: usize,
    engine: Option<&dyn CorrelationEngine>,
) -> String {
    // ---
    let mut out = String::new();

    let unit = snapshot.unit_id.as_deref().unwrap_or("-");
    let updated = snapshot
        .last_update
        .map(|t| t.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    let fetch = match snapshot.fetch_status {
        Some(FetchStatus::Loaded(n)) => format!("{n} loaded"),
        Some(FetchStatus::NoData) | Some(FetchStatus::Failed) => "no data".to_string(),
        None => "waiting".to_string(),
    };
    let _ = writeln!(out, "=== Soil monitoring | unit {unit} | updated {updated} | {fetch} ===");

    out.push_str(&render_metric_cards(&snapshot.metrics));
    out.push('\n');
    out.push_str(&render_correlations(snapshot.correlations.as_ref(), engine));
    out.push('\n');
    out.push_str(&render_table(snapshot, preview_rows));

    if let Some(notice) = &snapshot.notice {
        let _ = writeln!(out, "\n>> {notice}");
    }
    out
}

/// Print a frame each time the monitor publishes, until cancelled.
pub async fn run_presenter(
    mut rx: watch::Receiver<DashboardSnapshot>,
    preview_rows: usize,
    engine: Option<std::sync::Arc<dyn CorrelationEngine>>,
    cancel: CancellationToken,
) {
    // ---
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                let frame = render_dashboard(&snapshot, preview_rows, engine.as_deref());
                println!("{frame}");
            }
            _ = cancel.cancelled() => break,
        }
    }
}

// Zero counts as missing, as upstream renders it.
fn optional(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 => v.to_string(),
        _ => "N/A".to_string(),
    }
}
