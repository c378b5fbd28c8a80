//! Application entry point for the `soilwatch-monitor` service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing (to stderr)
//! - Building the identity chain, fetch client and report exporter
//! - Starting the presenter, console controls and refresh scheduler
//! - Shutting down on `quit` or Ctrl-C
//!
//! # Environment Variables
//! - `SOIL_API_URL` (optional) – readings API base URL
//! - `SOILWATCH_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `SOILWATCH_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::{env, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use soilwatch_monitor::{
    config, console,
    export::JsonReportRenderer,
    identity::{IdentityResolver, JsonFileStore, KeyValueStore, MemoryStore},
    render,
    scheduler::{self, Schedule},
    HttpReadingsClient, Monitor,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let session: Box<dyn KeyValueStore> = match &cfg.session_store_path {
        Some(path) => Box::new(JsonFileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    };
    let identity = IdentityResolver::new(
        cfg.unit_id.clone(),
        Box::new(JsonFileStore::new(&cfg.local_store_path)),
        session,
    );

    let source = Arc::new(HttpReadingsClient::new(&cfg.api_url, &cfg.api_resource));

    // No correlation engine ships with this binary; the panel reports it as
    // unavailable until one is plugged in with `Monitor::with_engine`.
    let monitor = Arc::new(
        Monitor::new(source, identity, cfg.default_window)
            .with_exporter(Arc::new(JsonReportRenderer), cfg.export_dir.clone()),
    );
    if monitor.engine().is_none() {
        tracing::warn!("No correlation engine configured");
    }

    let cancel = CancellationToken::new();
    let (trigger_tx, trigger_rx) = mpsc::channel(16);

    let presenter = tokio::spawn(render::run_presenter(
        monitor.subscribe(),
        cfg.table_preview_rows,
        monitor.engine_handle(),
        cancel.clone(),
    ));
    console::spawn_console(trigger_tx, cancel.clone())?;

    let schedule = Schedule {
        initial_delay: cfg.initial_delay,
        update_interval: cfg.update_interval,
    };
    let scheduler = tokio::spawn(scheduler::run(monitor, schedule, trigger_rx, cancel.clone()));

    println!("{}", console::HELP);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }

    scheduler.await?;
    presenter.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Output to stderr, leaving stdout to the dashboard
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `SOILWATCH_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `SOILWATCH_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("SOILWATCH_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to SOILWATCH_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SOILWATCH_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},hyper=warn,reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
