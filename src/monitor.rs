//! The monitor: data store, derived state and the single-flight refresh.
//!
//! All dashboard state lives in one [`DashboardSnapshot`] held by a
//! `tokio::sync::watch` channel. The refresh routine is the only writer of
//! readings and derived state; the presentation layer subscribes to the
//! channel and re-renders on every published change.
//!
//! A refresh runs in a fixed order: fetch, replace the readings, aggregate
//! metrics, publish (the render signal), compute correlations, publish again.
//! While one refresh is in flight every other refresh call returns
//! [`RefreshOutcome::Skipped`] immediately; nothing is queued.
//!
//! Identity lookups and report rendering touch the filesystem, so both run
//! on tokio's blocking pool.

use std::{
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    correlation::{analyze_correlations, CorrelationEngine, CorrelationPanel},
    error::ExportError,
    export::{export_report, ReportRenderer},
    fetch::{FetchResult, FetchStatus, ReadingsSource},
    identity::{IdentityResolver, DEFAULT_UNIT_ID},
    metrics::{aggregate, MetricsSnapshot},
    Reading, Window,
};

// ---

/// Source of "now", injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything the presentation layer needs to draw the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    // ---
    pub window: Window,
    /// Unit the current readings belong to; `None` before the first fetch.
    pub unit_id: Option<String>,
    /// Newest first. Replaced wholesale on every refresh.
    pub readings: Vec<Reading>,
    pub metrics: MetricsSnapshot,
    /// `None` until correlations have been computed once.
    pub correlations: Option<CorrelationPanel>,
    pub fetch_status: Option<FetchStatus>,
    pub last_update: Option<DateTime<Utc>>,
    pub table_expanded: bool,
    /// One-shot message for the user, e.g. the export result.
    pub notice: Option<String>,
}

impl DashboardSnapshot {
    // ---
    pub fn new(window: Window) -> Self {
        Self {
            window,
            unit_id: None,
            readings: Vec::new(),
            metrics: MetricsSnapshot::empty(),
            correlations: None,
            fetch_status: None,
            last_update: None,
            table_expanded: false,
            notice: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was in flight; this trigger was dropped.
    Skipped,
    Completed { readings: usize, status: FetchStatus },
}

/// Clears the in-flight flag when dropped, whichever way the refresh ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    // ---
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Export collaborator plus where its output goes.
pub struct Exporter {
    pub renderer: Arc<dyn ReportRenderer>,
    pub dir: PathBuf,
}

pub struct Monitor {
    // ---
    source: Arc<dyn ReadingsSource>,
    identity: Arc<IdentityResolver>,
    engine: Option<Arc<dyn CorrelationEngine>>,
    exporter: Option<Exporter>,
    clock: Arc<dyn Clock>,
    is_updating: AtomicBool,
    state: watch::Sender<DashboardSnapshot>,
}

impl Monitor {
    // ---
    pub fn new(
        source: Arc<dyn ReadingsSource>,
        identity: IdentityResolver,
        window: Window,
    ) -> Self {
        let (state, _) = watch::channel(DashboardSnapshot::new(window));
        Self {
            source,
            identity: Arc::new(identity),
            engine: None,
            exporter: None,
            clock: Arc::new(SystemClock),
            is_updating: AtomicBool::new(false),
            state,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn CorrelationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_exporter(
        mut self,
        renderer: Arc<dyn ReportRenderer>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.exporter = Some(Exporter {
            renderer,
            dir: dir.into(),
        });
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> Option<&dyn CorrelationEngine> {
        self.engine.as_deref()
    }

    /// Shared handle to the engine, for the presenter's correlation cards.
    pub fn engine_handle(&self) -> Option<Arc<dyn CorrelationEngine>> {
        self.engine.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.borrow().clone()
    }

    pub fn is_updating(&self) -> bool {
        self.is_updating.load(Ordering::Acquire)
    }

    /// Fetch the current window and recompute everything derived from it.
    pub async fn refresh(&self) -> RefreshOutcome {
        // ---
        let Some(_in_flight) = InFlight::acquire(&self.is_updating) else {
            debug!("Refresh already in flight, trigger dropped");
            return RefreshOutcome::Skipped;
        };

        let unit_id = self.resolve_unit_id().await;
        let window = self.state.borrow().window;
        info!("Refreshing readings for unit {} ({})", unit_id, window);

        let FetchResult { readings, status } = self.source.fetch(&unit_id, window).await;

        let count = readings.len();
        let metrics = aggregate(&readings);
        let now = self.clock.now();

        self.state.send_modify(|s| {
            s.unit_id = Some(unit_id);
            s.readings = readings;
            s.metrics = metrics;
            s.fetch_status = Some(status);
            s.last_update = Some(now);
        });

        self.recompute_correlations();

        RefreshOutcome::Completed {
            readings: count,
            status,
        }
    }

    /// Run the correlation adapter over the current readings and publish it.
    pub fn recompute_correlations(&self) -> CorrelationPanel {
        // ---
        let readings = self.state.borrow().readings.clone();
        let panel = analyze_correlations(self.engine(), &readings);

        self.state.send_modify(|s| s.correlations = Some(panel.clone()));
        panel
    }

    /// Select a new window. The next refresh fetches with it.
    pub fn set_window(&self, window: Window) -> bool {
        // ---
        let changed = self.state.send_if_modified(|s| {
            if s.window == window {
                return false;
            }
            s.window = window;
            true
        });

        if changed {
            info!("Window changed to {}", window);
        }
        changed
    }

    /// Expand or collapse the full table. Returns the new state.
    pub fn toggle_table(&self) -> bool {
        // ---
        let mut expanded = false;
        self.state.send_modify(|s| {
            s.table_expanded = !s.table_expanded;
            expanded = s.table_expanded;
        });
        expanded
    }

    /// Export the in-scope readings. The outcome is also posted as a notice.
    pub async fn export(&self) -> Result<PathBuf, ExportError> {
        // ---
        let snapshot = self.snapshot();

        let result = if snapshot.readings.is_empty() {
            Err(ExportError::NoData)
        } else if let Some(exporter) = &self.exporter {
            let renderer = Arc::clone(&exporter.renderer);
            let dir = exporter.dir.clone();
            let identity = Arc::clone(&self.identity);
            let now = self.clock.now();

            tokio::task::spawn_blocking(move || {
                let metrics = aggregate(&snapshot.readings);
                export_report(
                    renderer.as_ref(),
                    &dir,
                    &identity.resolve(),
                    snapshot.window,
                    &snapshot.readings,
                    &metrics,
                    now,
                )
            })
            .await
            .unwrap_or_else(|e| {
                Err(ExportError::Write {
                    path: exporter.dir.clone(),
                    source: io::Error::other(e),
                })
            })
        } else {
            Err(ExportError::NoRenderer)
        };

        let notice = match &result {
            Ok(path) => format!("Report written to {}", path.display()),
            Err(e) => {
                warn!("Export rejected: {}", e);
                e.to_string()
            }
        };
        self.state.send_modify(|s| s.notice = Some(notice));

        result
    }

    async fn resolve_unit_id(&self) -> String {
        // ---
        let identity = Arc::clone(&self.identity);
        match tokio::task::spawn_blocking(move || identity.resolve()).await {
            Ok(unit_id) => unit_id,
            Err(e) => {
                warn!("Unit id lookup failed: {}", e);
                DEFAULT_UNIT_ID.to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    // ---
    use std::{
        collections::VecDeque,
        path::Path,
        sync::{atomic::AtomicUsize, Mutex},
    };

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_pending, assert_ready_eq, task};

    use super::*;
    use crate::correlation::tests::{correlation, StubEngine};
    use crate::correlation::{Direction, Strength};
    use crate::export::Report;
    use crate::identity::{JsonFileStore, MemoryStore};
    use crate::models::tests::sample_reading;
    use crate::models::ReadingStatus::{Attention, Ideal};

    /// Source double that replays canned results and can hold a fetch open.
    pub(crate) struct ScriptedSource {
        pub calls: AtomicUsize,
        pub windows: Mutex<Vec<Window>>,
        pub units: Mutex<Vec<String>>,
        script: Mutex<VecDeque<FetchResult>>,
        gated: bool,
        pub entered: Notify,
        pub release: Notify,
    }

    impl ScriptedSource {
        // ---
        pub(crate) fn new(script: Vec<FetchResult>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                windows: Mutex::new(Vec::new()),
                units: Mutex::new(Vec::new()),
                script: Mutex::new(script.into()),
                gated: false,
                entered: Notify::new(),
                release: Notify::new(),
            }
        }

        pub(crate) fn gated(script: Vec<FetchResult>) -> Self {
            Self {
                gated: true,
                ..Self::new(script)
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReadingsSource for ScriptedSource {
        async fn fetch(&self, unit_id: &str, window: Window) -> FetchResult {
            // ---
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.windows.lock().unwrap().push(window);
            self.units.lock().unwrap().push(unit_id.to_string());

            if self.gated {
                self.entered.notify_one();
                self.release.notified().await;
            }

            self.script.lock().unwrap().pop_front().unwrap_or(FetchResult {
                readings: Vec::new(),
                status: FetchStatus::NoData,
            })
        }
    }

    pub(crate) struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    pub(crate) fn loaded(readings: Vec<Reading>) -> FetchResult {
        FetchResult {
            status: FetchStatus::Loaded(readings.len()),
            readings,
        }
    }

    pub(crate) fn failed() -> FetchResult {
        FetchResult {
            readings: Vec::new(),
            status: FetchStatus::Failed,
        }
    }

    pub(crate) fn test_monitor(source: Arc<ScriptedSource>) -> Monitor {
        // ---
        let identity = IdentityResolver::new(
            Some("unit-test".to_string()),
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        );
        Monitor::new(source, identity, Window::Last24Hours)
            .with_clock(Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 3, 26, 12, 0, 0).unwrap())))
    }

    fn pair() -> Vec<Reading> {
        vec![
            sample_reading("15:00", 6.0, Ideal),
            sample_reading("14:00", 7.0, Attention),
        ]
    }

    #[tokio::test]
    async fn test_refresh_updates_store_and_metrics() {
        // ---
        let source = Arc::new(ScriptedSource::new(vec![loaded(pair())]));
        let monitor = test_monitor(source.clone());

        let outcome = monitor.refresh().await;

        assert_eq!(
            outcome,
            RefreshOutcome::Completed {
                readings: 2,
                status: FetchStatus::Loaded(2)
            }
        );

        let snap = monitor.snapshot();
        assert_eq!(snap.unit_id.as_deref(), Some("unit-test"));
        assert_eq!(snap.readings.len(), 2);
        assert_eq!(snap.metrics.average_ph, "6.5");
        assert_eq!(snap.metrics.alert_count, 1);
        assert_eq!(snap.metrics.health_percent, 50);
        assert!(snap.last_update.is_some());
        // No engine configured.
        assert_eq!(snap.correlations, Some(CorrelationPanel::EngineUnavailable));
        assert!(!monitor.is_updating());
    }

    #[tokio::test]
    async fn test_latest_timestamp_tracks_each_refresh() {
        // ---
        let source = Arc::new(ScriptedSource::new(vec![
            loaded(pair()),
            loaded(vec![sample_reading("21:00", 6.8, Ideal)]),
            failed(),
        ]));
        let monitor = test_monitor(source.clone());

        monitor.refresh().await;
        assert_eq!(monitor.snapshot().metrics.latest_timestamp, "15:00");

        monitor.refresh().await;
        assert_eq!(monitor.snapshot().metrics.latest_timestamp, "21:00");

        // Failure collapses the store to empty.
        let outcome = monitor.refresh().await;
        assert_eq!(
            outcome,
            RefreshOutcome::Completed {
                readings: 0,
                status: FetchStatus::Failed
            }
        );
        let snap = monitor.snapshot();
        assert!(snap.readings.is_empty());
        assert_eq!(snap.metrics, MetricsSnapshot::empty());
        assert_eq!(snap.fetch_status, Some(FetchStatus::Failed));
        assert!(!monitor.is_updating());
    }

    #[tokio::test]
    async fn test_second_refresh_dropped_while_in_flight() {
        // ---
        let source = Arc::new(ScriptedSource::gated(vec![loaded(pair()), loaded(pair())]));
        let monitor = Arc::new(test_monitor(source.clone()));

        let first = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.refresh().await }
        });

        source.entered.notified().await;
        assert!(monitor.is_updating());

        assert_eq!(monitor.refresh().await, RefreshOutcome::Skipped);
        assert_eq!(monitor.refresh().await, RefreshOutcome::Skipped);
        assert_eq!(source.call_count(), 1);

        source.release.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Completed { readings: 2, .. }));
        assert!(!monitor.is_updating());

        // Guard released: the next trigger goes through.
        let second = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.refresh().await }
        });
        source.entered.notified().await;
        source.release.notify_one();
        assert!(matches!(second.await.unwrap(), RefreshOutcome::Completed { .. }));
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_flag_cleared_when_refresh_cancelled() {
        // ---
        let source = Arc::new(ScriptedSource::gated(vec![]));
        let monitor = Arc::new(test_monitor(source.clone()));

        let task = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.refresh().await }
        });
        source.entered.notified().await;
        assert!(monitor.is_updating());

        task.abort();
        let _ = task.await;
        assert!(!monitor.is_updating());
    }

    #[tokio::test]
    async fn test_window_change_used_by_next_fetch() {
        // ---
        let source = Arc::new(ScriptedSource::new(vec![]));
        let monitor = test_monitor(source.clone());

        assert!(monitor.set_window(Window::LastHour));
        assert!(!monitor.set_window(Window::LastHour));
        monitor.refresh().await;

        assert_eq!(*source.windows.lock().unwrap(), vec![Window::LastHour]);
        assert_eq!(monitor.snapshot().fetch_status, Some(FetchStatus::NoData));
    }

    #[tokio::test]
    async fn test_correlations_follow_readings() {
        // ---
        let engine = Arc::new(StubEngine::returning(vec![
            correlation(Strength::Strong, Direction::Positive),
            correlation(Strength::Weak, Direction::Negative),
        ]));
        let source = Arc::new(ScriptedSource::new(vec![
            loaded(vec![sample_reading("10:00", 6.0, Ideal)]),
            loaded(pair()),
        ]));
        let monitor = test_monitor(source).with_engine(engine.clone());

        monitor.refresh().await;
        assert_eq!(
            monitor.snapshot().correlations,
            Some(CorrelationPanel::InsufficientData { available: 1 })
        );
        assert_eq!(engine.call_count(), 0);

        monitor.refresh().await;
        let summary = monitor.snapshot().correlations.unwrap().summary();
        assert_eq!(
            (summary.total, summary.strong, summary.positive, summary.negative),
            (2, 1, 1, 1)
        );
        assert_eq!(engine.call_count(), 1);

        // Manual recalculation reuses the stored readings.
        monitor.recompute_correlations();
        assert_eq!(engine.call_count(), 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_published_state() {
        // ---
        let source = Arc::new(ScriptedSource::new(vec![loaded(pair())]));
        let monitor = test_monitor(source);
        let mut rx = monitor.subscribe();

        monitor.refresh().await;

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.readings.len(), 2);
        assert!(snap.correlations.is_some());
    }

    #[tokio::test]
    async fn test_refresh_reads_identity_file_off_runtime() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, r#"{"unityId": "unit-from-file"}"#).unwrap();

        let identity = IdentityResolver::new(
            None,
            Box::new(JsonFileStore::new(&path)),
            Box::new(MemoryStore::new()),
        );
        let source = Arc::new(ScriptedSource::new(vec![loaded(pair())]));
        let renderer = Arc::new(RecordingRenderer(Mutex::new(Vec::new())));
        let monitor = Monitor::new(source.clone(), identity, Window::Last24Hours)
            .with_exporter(renderer.clone(), dir.path());

        monitor.refresh().await;
        assert_eq!(*source.units.lock().unwrap(), vec!["unit-from-file".to_string()]);

        // The file is read again on export, so a changed id is picked up.
        std::fs::write(&path, r#"{"unityId": "unit-renamed"}"#).unwrap();
        monitor.export().await.unwrap();
        assert_eq!(renderer.0.lock().unwrap()[0].metadata.unit_id, "unit-renamed");
    }

    #[test]
    fn test_toggle_table() {
        // ---
        let monitor = test_monitor(Arc::new(ScriptedSource::new(vec![])));
        assert!(monitor.toggle_table());
        assert!(monitor.snapshot().table_expanded);
        assert!(!monitor.toggle_table());
    }

    struct RecordingRenderer(Mutex<Vec<Report>>);

    impl ReportRenderer for RecordingRenderer {
        fn render(&self, report: &Report, dir: &Path) -> Result<PathBuf, ExportError> {
            self.0.lock().unwrap().push(report.clone());
            Ok(dir.join(report.file_name("pdf")))
        }
    }

    #[tokio::test]
    async fn test_export_rejected_when_empty() {
        // ---
        let renderer = Arc::new(RecordingRenderer(Mutex::new(Vec::new())));
        let source = Arc::new(ScriptedSource::new(vec![failed(), loaded(pair())]));
        let monitor = test_monitor(source).with_exporter(renderer.clone(), "/reports");

        monitor.refresh().await;
        let err = monitor.export().await.unwrap_err();
        assert!(matches!(err, ExportError::NoData));
        assert!(renderer.0.lock().unwrap().is_empty());
        assert_eq!(monitor.snapshot().notice.as_deref(), Some("No data available to export"));

        monitor.refresh().await;
        let path = monitor.export().await.unwrap();
        assert_eq!(path, PathBuf::from("/reports/SoilMonitoringReport_20250326.pdf"));

        let reports = renderer.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].metadata.unit_id, "unit-test");
        assert_eq!(reports[0].rows.len(), 2);
    }

    #[tokio::test]
    async fn test_single_flight_polled_by_hand() {
        // ---
        let source = Arc::new(ScriptedSource::gated(vec![loaded(pair())]));
        let monitor = test_monitor(source.clone());

        let mut first = task::spawn(monitor.refresh());
        assert_pending!(first.poll());
        assert!(monitor.is_updating());

        let mut second = task::spawn(monitor.refresh());
        assert_ready_eq!(second.poll(), RefreshOutcome::Skipped);

        // The identity lookup finishes on the blocking pool, then the fetch starts.
        while source.call_count() == 0 {
            tokio::task::yield_now().await;
            assert_pending!(first.poll());
        }
        assert_eq!(source.call_count(), 1);

        source.release.notify_one();
        assert!(first.is_woken());
        assert_ready_eq!(
            first.poll(),
            RefreshOutcome::Completed {
                readings: 2,
                status: FetchStatus::Loaded(2)
            }
        );
        assert!(!monitor.is_updating());
    }

    #[tokio::test]
    async fn test_export_without_renderer() {
        // ---
        let monitor = test_monitor(Arc::new(ScriptedSource::new(vec![])));
        monitor.state.send_modify(|s| s.readings = pair());

        assert_err!(monitor.export().await);
        assert_eq!(
            monitor.snapshot().notice.as_deref(),
            Some("no report renderer configured")
        );
    }
}
