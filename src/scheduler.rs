//! Refresh scheduling: one delayed start-up refresh, a fixed-period timer and
//! user triggers, all routed through [`Monitor::refresh`]'s single-flight
//! guard.
//!
//! Refreshes are spawned rather than awaited inline so the loop keeps draining
//! triggers; a trigger that lands while a fetch is in flight is dropped by the
//! guard.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::ExportError,
    monitor::{Monitor, RefreshOutcome},
    Window,
};

// ---

/// User-initiated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Refresh,
    SetWindow(Window),
    /// Recompute correlations over the stored readings without refetching.
    Recalculate,
    Export,
    ToggleTable,
}

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub initial_delay: Duration,
    pub update_interval: Duration,
}

/// Drive the monitor until `cancel` fires.
pub async fn run(
    monitor: Arc<Monitor>,
    schedule: Schedule,
    mut triggers: mpsc::Receiver<Trigger>,
    cancel: CancellationToken,
) {
    // ---
    let initial = time::sleep(schedule.initial_delay);
    tokio::pin!(initial);
    let mut initial_pending = true;

    let mut ticker = time::interval_at(
        Instant::now() + schedule.update_interval,
        schedule.update_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Scheduler started: first refresh in {:?}, then every {:?}",
        schedule.initial_delay, schedule.update_interval
    );

    loop {
        tokio::select! {
            _ = &mut initial, if initial_pending => {
                initial_pending = false;
                spawn_refresh(&monitor, "startup");
            }
            _ = ticker.tick() => {
                spawn_refresh(&monitor, "timer");
            }
            Some(trigger) = triggers.recv() => {
                handle_trigger(&monitor, trigger);
            }
            _ = cancel.cancelled() => {
                info!("Scheduler shutting down");
                break;
            }
        }
    }
}

/// Apply one user trigger.
pub fn handle_trigger(
    monitor: &Arc<Monitor>,
    trigger: Trigger,
) -> Option<JoinHandle<RefreshOutcome>> {
    // ---
    debug!(?trigger, "Trigger received");

    match trigger {
        Trigger::Refresh => Some(spawn_refresh(monitor, "manual")),
        Trigger::SetWindow(window) => {
            monitor.set_window(window);
            Some(spawn_refresh(monitor, "window"))
        }
        Trigger::Recalculate => {
            monitor.recompute_correlations();
            None
        }
        Trigger::Export => {
            // Outcome is posted to the dashboard as a notice.
            spawn_export(monitor);
            None
        }
        Trigger::ToggleTable => {
            monitor.toggle_table();
            None
        }
    }
}

/// Run an export off the scheduler loop.
pub fn spawn_export(monitor: &Arc<Monitor>) -> JoinHandle<Result<PathBuf, ExportError>> {
    // ---
    let monitor = Arc::clone(monitor);
    tokio::spawn(async move { monitor.export().await })
}

fn spawn_refresh(monitor: &Arc<Monitor>, reason: &'static str) -> JoinHandle<RefreshOutcome> {
    // ---
    let monitor = Arc::clone(monitor);
    tokio::spawn(async move {
        let outcome = monitor.refresh().await;
        if outcome == RefreshOutcome::Skipped {
            debug!("{} refresh skipped, another one is in flight", reason);
        }
        outcome
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::fetch::FetchStatus;
    use crate::models::tests::sample_reading;
    use crate::models::ReadingStatus::Ideal;
    use crate::monitor::tests::{loaded, test_monitor, ScriptedSource};

    fn schedule(initial_secs: u64, interval_secs: u64) -> Schedule {
        Schedule {
            initial_delay: Duration::from_secs(initial_secs),
            update_interval: Duration::from_secs(interval_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_then_periodic_refresh() {
        // ---
        let source = Arc::new(ScriptedSource::new(vec![]));
        let monitor = Arc::new(test_monitor(source.clone()));
        let (_tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(monitor, schedule(1, 30), rx, cancel.clone()));

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.call_count(), 0);

        time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(source.call_count(), 1);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.call_count(), 2);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.call_count(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_dropped_while_in_flight() {
        // ---
        let source = Arc::new(ScriptedSource::gated(vec![loaded(vec![sample_reading(
            "08:00", 6.1, Ideal,
        )])]));
        let monitor = Arc::new(test_monitor(source.clone()));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(monitor.clone(), schedule(3600, 3600), rx, cancel.clone()));

        tx.send(Trigger::Refresh).await.unwrap();
        source.entered.notified().await;

        tx.send(Trigger::Refresh).await.unwrap();
        tx.send(Trigger::SetWindow(Window::Last7Days)).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(source.call_count(), 1);
        // The window is still recorded for the next refresh.
        assert_eq!(monitor.snapshot().window, Window::Last7Days);

        source.release.notify_one();
        time::sleep(Duration::from_millis(10)).await;
        assert!(!monitor.is_updating());
        assert_eq!(monitor.snapshot().fetch_status, Some(FetchStatus::Loaded(1)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_trigger_actions() {
        // ---
        let source = Arc::new(ScriptedSource::new(vec![loaded(vec![
            sample_reading("09:00", 6.0, Ideal),
            sample_reading("08:00", 6.2, Ideal),
        ])]));
        let monitor = Arc::new(test_monitor(source.clone()));

        let outcome = handle_trigger(&monitor, Trigger::SetWindow(Window::LastHour))
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(outcome, RefreshOutcome::Completed { readings: 2, .. }));
        assert_eq!(*source.windows.lock().unwrap(), vec![Window::LastHour]);

        assert!(handle_trigger(&monitor, Trigger::ToggleTable).is_none());
        assert!(monitor.snapshot().table_expanded);

        assert!(handle_trigger(&monitor, Trigger::Recalculate).is_none());
        assert!(monitor.snapshot().correlations.is_some());

        assert!(handle_trigger(&monitor, Trigger::Export).is_none());

        // No exporter configured: the notice says so.
        let result = spawn_export(&monitor).await.unwrap();
        assert!(matches!(result, Err(ExportError::NoRenderer)));
        assert_eq!(
            monitor.snapshot().notice.as_deref(),
            Some("no report renderer configured")
        );
        assert_eq!(source.call_count(), 1);
    }
}
